//! [`JobControlApi`] backed by the AWS SDK S3 Control client.

use async_trait::async_trait;
use aws_sdk_s3control::error::DisplayErrorContext;
use aws_sdk_s3control::types::{
    JobManifest, JobManifestFieldName, JobManifestFormat, JobManifestLocation, JobManifestSpec,
    JobOperation, JobReport, JobStatus as SdkJobStatus, S3CannedAccessControlList,
    S3CopyObjectOperation,
};
use tracing::debug;
use uuid::Uuid;

use bulkcopy_core::{BatchJobSpec, CannedAcl, JobProgress, JobStatus, MigrationError, Result};

use crate::store::JobControlApi;

fn remote_err<E>(operation: &'static str) -> impl FnOnce(E) -> MigrationError
where
    E: std::error::Error + 'static,
{
    move |e| MigrationError::remote(operation, DisplayErrorContext(&e).to_string())
}

/// Collapse the S3 Batch Operations lifecycle onto the engine's five states.
fn map_status(status: Option<&SdkJobStatus>) -> JobStatus {
    match status {
        Some(SdkJobStatus::Complete) => JobStatus::Complete,
        Some(SdkJobStatus::Failed) => JobStatus::Failed,
        Some(SdkJobStatus::Cancelled) => JobStatus::Cancelled,
        Some(
            SdkJobStatus::Active
            | SdkJobStatus::Completing
            | SdkJobStatus::Failing
            | SdkJobStatus::Cancelling
            | SdkJobStatus::Pausing,
        ) => JobStatus::Active,
        _ => JobStatus::Queued,
    }
}

/// S3 Batch Operations job control.
pub struct S3ControlJobs {
    client: aws_sdk_s3control::Client,
}

impl S3ControlJobs {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3control::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl JobControlApi for S3ControlJobs {
    async fn create_job(&self, spec: &BatchJobSpec) -> Result<String> {
        const OP: &str = "CreateJob";
        let build_err =
            |e: aws_sdk_s3control::error::BuildError| MigrationError::remote(OP, e.to_string());

        let manifest = JobManifest::builder()
            .spec(
                JobManifestSpec::builder()
                    .format(JobManifestFormat::S3BatchOperationsCsv20180820)
                    .fields(JobManifestFieldName::Bucket)
                    .fields(JobManifestFieldName::Key)
                    .build()
                    .map_err(build_err)?,
            )
            .location(
                JobManifestLocation::builder()
                    .object_arn(spec.manifest.arn())
                    .e_tag(&spec.manifest.etag)
                    .build()
                    .map_err(build_err)?,
            )
            .build();

        let copy = S3CopyObjectOperation::builder()
            .target_resource(spec.target_arn())
            .set_canned_access_control_list(spec.canned_acl.map(|acl| match acl {
                CannedAcl::BucketOwnerFullControl => {
                    S3CannedAccessControlList::BucketOwnerFullControl
                }
            }))
            .build();

        debug!(
            manifest = %spec.manifest.arn(),
            target = %spec.target_arn(),
            stage = %spec.stage,
            "Submitting batch copy job"
        );

        let out = self
            .client
            .create_job()
            .account_id(&spec.account_id)
            .role_arn(&spec.role_arn)
            .priority(spec.priority)
            .confirmation_required(false)
            .client_request_token(Uuid::new_v4().to_string())
            .description(spec.description())
            .manifest(manifest)
            .operation(JobOperation::builder().s3_put_object_copy(copy).build())
            .report(JobReport::builder().enabled(false).build())
            .send()
            .await
            .map_err(remote_err(OP))?;

        out.job_id()
            .map(str::to_string)
            .ok_or_else(|| MigrationError::remote(OP, "response is missing a job id"))
    }

    async fn describe_job(&self, account_id: &str, job_id: &str) -> Result<JobProgress> {
        const OP: &str = "DescribeJob";

        let out = self
            .client
            .describe_job()
            .account_id(account_id)
            .job_id(job_id)
            .send()
            .await
            .map_err(remote_err(OP))?;

        let job = out
            .job()
            .ok_or_else(|| MigrationError::remote(OP, "response is missing the job descriptor"))?;
        let summary = job.progress_summary();

        Ok(JobProgress {
            job_id: job.job_id().unwrap_or(job_id).to_string(),
            status: map_status(job.status()),
            succeeded: summary.and_then(|s| s.number_of_tasks_succeeded()).unwrap_or(0),
            failed: summary.and_then(|s| s.number_of_tasks_failed()).unwrap_or(0),
            total: summary.and_then(|s| s.total_number_of_tasks()).unwrap_or(0),
        })
    }
}
