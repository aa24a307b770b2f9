//! Batch job submission and progress polling.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use bulkcopy_core::{BatchJobSpec, JobProgress, Result};

use crate::cancel;
use crate::store::JobControlApi;

pub struct JobPoller<'a> {
    jobs: &'a dyn JobControlApi,
    warmup: Duration,
    interval: Duration,
    cancel: &'a CancellationToken,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        jobs: &'a dyn JobControlApi,
        warmup: Duration,
        interval: Duration,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            jobs,
            warmup,
            interval,
            cancel,
        }
    }

    /// Submit `spec` and block until the job reaches a terminal status.
    #[instrument(skip_all, fields(stage = %spec.stage))]
    pub async fn submit_and_wait(&self, spec: &BatchJobSpec) -> Result<JobProgress> {
        let job_id = cancel::cancellable(self.cancel, self.jobs.create_job(spec)).await?;
        info!(job_id = %job_id, manifest = %spec.manifest.key, "Batch copy job created");
        self.wait_for_completion(&spec.account_id, &job_id).await
    }

    /// Poll until terminal. A failed status lookup ends the wait with its error.
    pub async fn wait_for_completion(&self, account_id: &str, job_id: &str) -> Result<JobProgress> {
        cancel::sleep(self.cancel, self.warmup).await?;

        loop {
            let progress =
                cancel::cancellable(self.cancel, self.jobs.describe_job(account_id, job_id))
                    .await?;
            info!(
                job_id = %job_id,
                status = ?progress.status,
                succeeded = progress.succeeded,
                failed = progress.failed,
                total = progress.total,
                "Batch job progress"
            );

            if progress.status.is_terminal() {
                return Ok(progress);
            }
            cancel::sleep(self.cancel, self.interval).await?;
        }
    }
}
