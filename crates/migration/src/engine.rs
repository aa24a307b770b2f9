//! End-to-end migration run.

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use bulkcopy_core::{
    JobDraft, JobProgress, ManifestReference, MigrationConfig, MigrationError, Result,
    ThresholdStage,
};

use crate::cancel::cancellable;
use crate::inventory::InventoryManager;
use crate::locator::{ManifestLocator, RetryPolicy};
use crate::orchestrator::{JobPlan, JobPlanner, PlanShape};
use crate::poller::JobPoller;
use crate::store::{JobControlApi, ObjectStoreApi};
use crate::threshold::enforce_threshold;

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub manifest: ManifestReference,
    pub plan: PlanShape,
    /// Final progress of every submitted job, in submission order.
    pub jobs: Vec<JobProgress>,
    /// `None` when no job had any tasks to copy.
    pub success_ratio: Option<f64>,
}

/// Drives one migration: inventory, manifest, filtered manifests, batch jobs.
pub struct Migration<'a> {
    store: &'a dyn ObjectStoreApi,
    jobs: &'a dyn JobControlApi,
    cancel: CancellationToken,
}

impl<'a> Migration<'a> {
    pub fn new(store: &'a dyn ObjectStoreApi, jobs: &'a dyn JobControlApi) -> Self {
        Self {
            store,
            jobs,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, config: &MigrationConfig) -> Result<MigrationReport> {
        let span = info_span!(
            "migration",
            source = %config.source_bucket,
            destination = config.destination_bucket.as_deref().unwrap_or("")
        );
        self.execute(config).instrument(span).await
    }

    async fn execute(&self, config: &MigrationConfig) -> Result<MigrationReport> {
        let destination = config.destination_bucket.as_deref().ok_or_else(|| {
            MigrationError::InvalidArgument("a destination bucket is required".into())
        })?;
        let tuning = &config.tuning;
        config.log_summary();

        let versioning = cancellable(
            &self.cancel,
            self.store.get_versioning(&config.source_bucket),
        )
        .await?;
        info!(versioning = ?versioning, "Source bucket versioning");

        let location = cancellable(
            &self.cancel,
            InventoryManager::new(self.store).ensure(
                &config.source_bucket,
                &config.inventory_config,
                config.owns_inventory_config(),
            ),
        )
        .await?;

        let policy = RetryPolicy {
            retries: tuning.manifest_retries,
            interval: config.retry_interval,
        };
        let manifest = ManifestLocator::new(self.store)
            .wait_for_manifest(&location, policy, &self.cancel)
            .await?;

        let draft = JobDraft {
            account_id: config.account_id.clone(),
            role_arn: config.role_arn.clone(),
            source_bucket: config.source_bucket.clone(),
            target_bucket: destination.to_string(),
            versioning_disabled: versioning.versioning_disabled(),
            priority: tuning.job_priority,
        };
        let plan = cancellable(
            &self.cancel,
            JobPlanner::new(self.store, tuning.upload_part_size).plan(
                &draft,
                &manifest,
                &config.filters,
            ),
        )
        .await?;

        let poller = JobPoller::new(
            self.jobs,
            tuning.job_warmup,
            tuning.job_poll_interval,
            &self.cancel,
        );
        let mut finished = Vec::new();
        match &plan {
            JobPlan::NoVersioning(spec) | JobPlan::LatestOnly(spec) | JobPlan::NonLatestOnly(spec) => {
                finished.push(poller.submit_and_wait(spec).await?);
            }
            JobPlan::DualOrdered { non_latest, latest } => {
                let first = poller.submit_and_wait(non_latest).await?;
                enforce_threshold(
                    ThresholdStage::NonLatestGate,
                    [&first],
                    config.success_threshold,
                )?;
                finished.push(first);
                finished.push(poller.submit_and_wait(latest).await?);
            }
        }

        let ratio =
            enforce_threshold(ThresholdStage::Overall, &finished, config.success_threshold)?;
        info!(jobs = finished.len(), success_ratio = ?ratio, "Migration complete");

        Ok(MigrationReport {
            manifest,
            plan: plan.shape(),
            jobs: finished,
            success_ratio: ratio,
        })
    }
}
