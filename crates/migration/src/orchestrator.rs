//! Job planning: which batch copy jobs a run submits, in which order.

use tracing::{info, instrument, warn};

use bulkcopy_core::{
    BatchJobSpec, CannedAcl, FilterCriteria, JobDraft, JobStage, LatestOnly, ManifestReference,
    ObjectOwnership, Result,
};

use crate::manifest::ManifestFilter;
use crate::store::ObjectStoreApi;

/// Job plan without the per-job manifests, decided from the bucket state alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanShape {
    NoVersioning,
    LatestOnly,
    NonLatestOnly,
    DualOrdered,
}

impl PlanShape {
    pub fn decide(versioning_disabled: bool, latest_only: Option<LatestOnly>) -> Self {
        match (versioning_disabled, latest_only) {
            (true, _) => PlanShape::NoVersioning,
            (false, Some(LatestOnly::Yes)) => PlanShape::LatestOnly,
            (false, Some(LatestOnly::No)) => PlanShape::NonLatestOnly,
            (false, None) => PlanShape::DualOrdered,
        }
    }

    /// Stages in submission order, each with the latest-only filter it applies.
    pub fn stages(&self, latest_only: Option<LatestOnly>) -> Vec<(JobStage, Option<LatestOnly>)> {
        match self {
            PlanShape::NoVersioning => vec![(JobStage::NonVersioned, latest_only)],
            PlanShape::LatestOnly => vec![(JobStage::Latest, Some(LatestOnly::Yes))],
            PlanShape::NonLatestOnly => vec![(JobStage::NonLatest, Some(LatestOnly::No))],
            PlanShape::DualOrdered => vec![
                (JobStage::NonLatest, Some(LatestOnly::No)),
                (JobStage::Latest, Some(LatestOnly::Yes)),
            ],
        }
    }
}

/// Batch copy jobs of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPlan {
    NoVersioning(BatchJobSpec),
    LatestOnly(BatchJobSpec),
    NonLatestOnly(BatchJobSpec),
    /// Non-latest versions are copied first so the latest version of every
    /// key lands last; the latest job only runs if the first one clears the
    /// success threshold.
    DualOrdered {
        non_latest: BatchJobSpec,
        latest: BatchJobSpec,
    },
}

impl JobPlan {
    pub fn shape(&self) -> PlanShape {
        match self {
            JobPlan::NoVersioning(_) => PlanShape::NoVersioning,
            JobPlan::LatestOnly(_) => PlanShape::LatestOnly,
            JobPlan::NonLatestOnly(_) => PlanShape::NonLatestOnly,
            JobPlan::DualOrdered { .. } => PlanShape::DualOrdered,
        }
    }
}

/// Canned ACL the copy must carry for the destination's ownership setting.
pub fn ownership_acl(rules: &[ObjectOwnership]) -> Option<CannedAcl> {
    rules
        .iter()
        .any(|r| *r == ObjectOwnership::BucketOwnerEnforced)
        .then_some(CannedAcl::BucketOwnerFullControl)
}

pub struct JobPlanner<'a> {
    store: &'a dyn ObjectStoreApi,
    filter: ManifestFilter<'a>,
}

impl<'a> JobPlanner<'a> {
    pub fn new(store: &'a dyn ObjectStoreApi, part_size: usize) -> Self {
        Self {
            store,
            filter: ManifestFilter::new(store, part_size),
        }
    }

    /// Filter one manifest per job and assemble the plan.
    #[instrument(skip_all, fields(source = %draft.source_bucket, destination = %draft.target_bucket))]
    pub async fn plan(
        &self,
        draft: &JobDraft,
        manifest: &ManifestReference,
        criteria: &FilterCriteria,
    ) -> Result<JobPlan> {
        let shape = PlanShape::decide(draft.versioning_disabled, criteria.latest_only);
        info!(plan = ?shape, "Planning batch copy jobs");

        Ok(match shape {
            PlanShape::NoVersioning => JobPlan::NoVersioning(
                self.build_spec(draft, manifest, criteria, JobStage::NonVersioned)
                    .await?,
            ),
            PlanShape::LatestOnly => JobPlan::LatestOnly(
                self.build_spec(draft, manifest, criteria, JobStage::Latest)
                    .await?,
            ),
            PlanShape::NonLatestOnly => JobPlan::NonLatestOnly(
                self.build_spec(draft, manifest, criteria, JobStage::NonLatest)
                    .await?,
            ),
            PlanShape::DualOrdered => {
                let non_latest = self
                    .build_spec(
                        draft,
                        manifest,
                        &criteria.with_latest_only(LatestOnly::No),
                        JobStage::NonLatest,
                    )
                    .await?;
                let latest = self
                    .build_spec(
                        draft,
                        manifest,
                        &criteria.with_latest_only(LatestOnly::Yes),
                        JobStage::Latest,
                    )
                    .await?;
                JobPlan::DualOrdered { non_latest, latest }
            }
        })
    }

    async fn build_spec(
        &self,
        draft: &JobDraft,
        manifest: &ManifestReference,
        criteria: &FilterCriteria,
        stage: JobStage,
    ) -> Result<BatchJobSpec> {
        let uploaded = self
            .filter
            .filter(manifest, criteria, draft.versioning_disabled, stage)
            .await?;
        let canned_acl = self.ownership_override(&draft.target_bucket).await;

        Ok(BatchJobSpec {
            account_id: draft.account_id.clone(),
            role_arn: draft.role_arn.clone(),
            source_bucket: draft.source_bucket.clone(),
            target_bucket: draft.target_bucket.clone(),
            manifest: uploaded,
            versioned: !draft.versioning_disabled,
            stage,
            canned_acl,
            priority: draft.priority,
        })
    }

    async fn ownership_override(&self, bucket: &str) -> Option<CannedAcl> {
        match self.store.get_ownership_controls(bucket).await {
            Ok(rules) => ownership_acl(&rules),
            Err(e) => {
                warn!(bucket = %bucket, error = %e, "Could not read destination ownership controls");
                None
            }
        }
    }
}
