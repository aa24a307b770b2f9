//! Read-only preflight of a migration.

use std::path::Path;

use tracing::{info, info_span, warn, Instrument};

use bulkcopy_core::{
    CannedAcl, JobStage, ManifestDocument, ManifestLocation, ManifestReference, MigrationConfig,
    MigrationError, Result, VersioningStatus,
};

use crate::expression::{build_expression, ExpressionFilters};
use crate::inventory::{owned_location, InventoryAction, InventoryManager};
use crate::locator::ManifestLocator;
use crate::orchestrator::{ownership_acl, PlanShape};
use crate::store::ObjectStoreApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryReadiness {
    /// An enabled configuration already delivers manifests.
    Ready,
    /// `run` would create or enable the owned configuration.
    WouldProvision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationCheck {
    pub bucket: String,
    /// False when the ownership lookup failed.
    pub readable: bool,
    pub canned_acl: Option<CannedAcl>,
}

/// What `run` would find and do, gathered without writing anything.
#[derive(Debug, Clone)]
pub struct DryRunReport {
    pub versioning: VersioningStatus,
    pub inventory: InventoryReadiness,
    pub location: ManifestLocation,
    pub manifest: Option<ManifestReference>,
    pub destination: Option<DestinationCheck>,
    pub plan: PlanShape,
    /// Select expression per job, when a local manifest was given.
    pub expressions: Vec<(JobStage, String)>,
}

impl DryRunReport {
    pub fn log(&self) {
        info!("Dry run summary:");
        info!("  versioning:  {:?}", self.versioning);
        info!("  inventory:   {:?}", self.inventory);
        info!(
            "  manifests:   s3://{}/{} (window {})",
            self.location.bucket,
            self.location.prefix,
            self.location.window.units()
        );
        match &self.manifest {
            Some(m) => info!("  latest:      {} ({})", m.key, m.last_modified),
            None => info!("  latest:      (none delivered yet)"),
        }
        if let Some(dest) = &self.destination {
            info!(
                "  destination: {} (ownership readable={}, acl={:?})",
                dest.bucket, dest.readable, dest.canned_acl
            );
        }
        info!("  plan:        {:?}", self.plan);
        for (stage, expression) in &self.expressions {
            info!("  {}: {}", stage, expression);
        }
    }
}

/// Check everything `run` depends on without creating, uploading or submitting.
///
/// Precondition failures (unowned inventory missing or disabled) are
/// returned as errors, exactly as `run` would fail.
pub async fn dry_run(
    store: &dyn ObjectStoreApi,
    config: &MigrationConfig,
    local_manifest: Option<&Path>,
) -> Result<DryRunReport> {
    let span = info_span!("dry_run", source = %config.source_bucket);
    inspect(store, config, local_manifest).instrument(span).await
}

async fn inspect(
    store: &dyn ObjectStoreApi,
    config: &MigrationConfig,
    local_manifest: Option<&Path>,
) -> Result<DryRunReport> {
    let versioning = store.get_versioning(&config.source_bucket).await?;

    let action = InventoryManager::new(store)
        .inspect(
            &config.source_bucket,
            &config.inventory_config,
            config.owns_inventory_config(),
        )
        .await?;
    let (inventory, location, manifest) = match action {
        InventoryAction::Reuse(location) => {
            let manifest = ManifestLocator::new(store).find_latest(&location).await?;
            (InventoryReadiness::Ready, location, manifest)
        }
        InventoryAction::Provision(_) => (
            InventoryReadiness::WouldProvision,
            owned_location(&config.source_bucket, &config.inventory_config),
            None,
        ),
    };

    let destination = match config.destination_bucket.as_deref() {
        Some(bucket) => Some(match store.get_ownership_controls(bucket).await {
            Ok(rules) => DestinationCheck {
                bucket: bucket.to_string(),
                readable: true,
                canned_acl: ownership_acl(&rules),
            },
            Err(e) => {
                warn!(bucket = %bucket, error = %e, "Could not read destination ownership controls");
                DestinationCheck {
                    bucket: bucket.to_string(),
                    readable: false,
                    canned_acl: None,
                }
            }
        }),
        None => None,
    };

    let versioning_disabled = versioning.versioning_disabled();
    let plan = PlanShape::decide(versioning_disabled, config.filters.latest_only);

    let mut expressions = Vec::new();
    if let Some(path) = local_manifest {
        let body = tokio::fs::read(path).await.map_err(|e| {
            MigrationError::InvalidArgument(format!(
                "cannot read local manifest '{}': {e}",
                path.display()
            ))
        })?;
        let document = ManifestDocument::parse(&body)?;
        for (stage, latest_only) in plan.stages(config.filters.latest_only) {
            let filters = ExpressionFilters {
                latest_only,
                ..ExpressionFilters::from(&config.filters)
            };
            let expression = build_expression(&document.file_schema, filters, versioning_disabled)?;
            expressions.push((stage, expression.to_string()));
        }
    }

    Ok(DryRunReport {
        versioning,
        inventory,
        location,
        manifest,
        destination,
        plan,
        expressions,
    })
}
