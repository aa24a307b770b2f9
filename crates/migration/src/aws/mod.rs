//! AWS SDK implementations of the remote service seams.

pub mod control;
pub mod s3;

use aws_config::BehaviorVersion;
use tracing::info;

pub use control::S3ControlJobs;
pub use s3::S3Store;

/// Both AWS clients built from one shared SDK configuration.
pub struct AwsClients {
    pub store: S3Store,
    pub jobs: S3ControlJobs,
}

impl AwsClients {
    /// Load credentials from the default provider chain for `region`.
    pub async fn for_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_types::region::Region::new(region.to_string()))
            .load()
            .await;

        info!(region = %region, "AWS clients initialised");

        Self {
            store: S3Store::new(&sdk_config),
            jobs: S3ControlJobs::new(&sdk_config),
        }
    }
}
