//! Remote service seams.
//!
//! The engine talks to S3 and S3 Batch Operations only through
//! [`ObjectStoreApi`] and [`JobControlApi`]. The AWS SDK implementations live
//! in [`crate::aws`]; in-memory fakes for tests live in [`crate::testing`].

use async_trait::async_trait;
use bytes::Bytes;

use bulkcopy_core::{
    BatchJobSpec, Encryption, InventoryFeedConfig, JobProgress, ObjectOwnership, ObjectSummary,
    Result, VersioningStatus,
};

/// A server-side filtered query over one compressed CSV object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectRequest {
    pub bucket: String,
    pub key: String,
    pub expression: String,
}

/// Events pushed by a select query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectEvent {
    Records(Bytes),
    Progress,
    Stats,
    Continuation,
    End,
}

/// Push-based event stream of a running select query.
#[async_trait]
pub trait SelectEventSource: Send {
    /// Next event, or `None` once the channel has closed.
    async fn next_event(&mut self) -> Result<Option<SelectEvent>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Object store operations the engine consumes.
#[async_trait]
pub trait ObjectStoreApi: Send + Sync {
    /// Returns `None` when the bucket has no configuration with this name.
    async fn get_inventory_config(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Option<InventoryFeedConfig>>;

    async fn put_inventory_config(&self, bucket: &str, config: &InventoryFeedConfig) -> Result<()>;

    /// All objects under `prefix` whose keys sort after `start_after`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: &str,
    ) -> Result<Vec<ObjectSummary>>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    async fn head_object_etag(&self, bucket: &str, key: &str) -> Result<String>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        encryption: &Encryption,
    ) -> Result<()>;

    /// Returns the upload id.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        encryption: &Encryption,
    ) -> Result<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus>;

    /// Object ownership rules configured on the bucket.
    async fn get_ownership_controls(&self, bucket: &str) -> Result<Vec<ObjectOwnership>>;

    async fn select_object_content(
        &self,
        request: &SelectRequest,
    ) -> Result<Box<dyn SelectEventSource>>;
}

/// Batch job control operations the engine consumes.
#[async_trait]
pub trait JobControlApi: Send + Sync {
    /// Submit a copy job, returning its id.
    async fn create_job(&self, spec: &BatchJobSpec) -> Result<String>;

    async fn describe_job(&self, account_id: &str, job_id: &str) -> Result<JobProgress>;
}
