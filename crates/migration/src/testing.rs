//! In-memory fakes of the remote service seams.
//!
//! Both fakes record every call so tests can assert on what a run did
//! without touching AWS.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use bulkcopy_core::{
    BatchJobSpec, Encryption, InventoryFeedConfig, JobProgress, JobStatus, MigrationError,
    ObjectOwnership, ObjectSummary, Result, VersioningStatus,
};

use crate::store::{
    CompletedPart, JobControlApi, ObjectStoreApi, SelectEvent, SelectEventSource, SelectRequest,
};

// ── Select events ─────────────────────────────────────────────

/// Replays a fixed list of select events, then closes or fails.
pub struct ScriptedEvents {
    events: VecDeque<SelectEvent>,
    failure: Option<String>,
}

impl ScriptedEvents {
    pub fn new(events: Vec<SelectEvent>) -> Self {
        Self {
            events: events.into(),
            failure: None,
        }
    }

    /// Replays `events`, then fails with a remote error instead of closing.
    pub fn failing(events: Vec<SelectEvent>, message: &str) -> Self {
        Self {
            events: events.into(),
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl SelectEventSource for ScriptedEvents {
    async fn next_event(&mut self) -> Result<Option<SelectEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        match self.failure.take() {
            Some(message) => Err(MigrationError::remote("SelectObjectContent", message)),
            None => Ok(None),
        }
    }
}

// ── Object store ──────────────────────────────────────────────

struct StoredObject {
    body: Bytes,
    last_modified: DateTime<Utc>,
    etag: String,
    encryption: Option<Encryption>,
}

struct PendingUpload {
    bucket: String,
    key: String,
    encryption: Encryption,
    parts: BTreeMap<i32, Bytes>,
}

#[derive(Default)]
struct StoreState {
    inventory: HashMap<(String, String), InventoryFeedConfig>,
    objects: BTreeMap<(String, String), StoredObject>,
    versioning: HashMap<String, VersioningStatus>,
    ownership: HashMap<String, Vec<ObjectOwnership>>,
    ownership_fails: bool,
    select_outputs: HashMap<String, Vec<SelectEvent>>,
    uploads: HashMap<String, PendingUpload>,
    failing_lists: u32,
    failing_part: Option<i32>,
    next_id: u64,

    operations: Vec<&'static str>,
    list_calls: Vec<(String, String, String)>,
    select_calls: Vec<SelectRequest>,
    inventory_writes: usize,
    multipart_started: usize,
    multipart_aborted: usize,
    parts_uploaded: usize,
}

impl StoreState {
    fn next_etag(&mut self) -> String {
        self.next_id += 1;
        format!("\"{:032x}\"", self.next_id)
    }
}

/// Object store held in memory.
///
/// Buckets are unversioned with no ownership rules unless configured.
#[derive(Default)]
pub struct FakeObjectStore {
    state: Mutex<StoreState>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        last_modified: DateTime<Utc>,
        body: impl Into<Bytes>,
    ) {
        let mut state = self.state();
        let etag = state.next_etag();
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                last_modified,
                etag,
                encryption: None,
            },
        );
    }

    pub fn set_inventory_config(&self, bucket: &str, config: InventoryFeedConfig) {
        self.state()
            .inventory
            .insert((bucket.to_string(), config.name.clone()), config);
    }

    pub fn set_versioning(&self, bucket: &str, status: VersioningStatus) {
        self.state().versioning.insert(bucket.to_string(), status);
    }

    pub fn set_ownership(&self, bucket: &str, rules: Vec<ObjectOwnership>) {
        self.state().ownership.insert(bucket.to_string(), rules);
    }

    pub fn fail_ownership_lookup(&self) {
        self.state().ownership_fails = true;
    }

    /// Events returned by every select over `key`.
    pub fn set_select_output(&self, key: &str, events: Vec<SelectEvent>) {
        self.state().select_outputs.insert(key.to_string(), events);
    }

    /// Make the next `count` listings fail with a remote error.
    pub fn fail_next_lists(&self, count: u32) {
        self.state().failing_lists = count;
    }

    /// Make every upload of part `part_number` fail.
    pub fn fail_part(&self, part_number: i32) {
        self.state().failing_part = Some(part_number);
    }

    pub fn object_body(&self, bucket: &str, key: &str) -> Option<String> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| String::from_utf8_lossy(&o.body).into_owned())
    }

    pub fn object_encryption(&self, bucket: &str, key: &str) -> Option<Encryption> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .and_then(|o| o.encryption.clone())
    }

    /// Operation names in call order.
    pub fn operations(&self) -> Vec<&'static str> {
        self.state().operations.clone()
    }

    /// Calls that changed remote state.
    pub fn write_operations(&self) -> Vec<&'static str> {
        self.operations()
            .into_iter()
            .filter(|op| {
                matches!(
                    *op,
                    "PutBucketInventoryConfiguration"
                        | "PutObject"
                        | "CreateMultipartUpload"
                        | "UploadPart"
                        | "CompleteMultipartUpload"
                        | "AbortMultipartUpload"
                )
            })
            .collect()
    }

    /// `(bucket, prefix, start_after)` of every listing.
    pub fn list_calls(&self) -> Vec<(String, String, String)> {
        self.state().list_calls.clone()
    }

    pub fn select_calls(&self) -> Vec<SelectRequest> {
        self.state().select_calls.clone()
    }

    pub fn inventory_writes(&self) -> usize {
        self.state().inventory_writes
    }

    pub fn multipart_uploads_started(&self) -> usize {
        self.state().multipart_started
    }

    pub fn multipart_uploads_aborted(&self) -> usize {
        self.state().multipart_aborted
    }

    pub fn parts_uploaded(&self) -> usize {
        self.state().parts_uploaded
    }
}

fn no_such_key(operation: &'static str, bucket: &str, key: &str) -> MigrationError {
    MigrationError::remote(operation, format!("NoSuchKey: s3://{bucket}/{key}"))
}

#[async_trait]
impl ObjectStoreApi for FakeObjectStore {
    async fn get_inventory_config(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Option<InventoryFeedConfig>> {
        let mut state = self.state();
        state.operations.push("GetBucketInventoryConfiguration");
        Ok(state
            .inventory
            .get(&(bucket.to_string(), name.to_string()))
            .cloned())
    }

    async fn put_inventory_config(&self, bucket: &str, config: &InventoryFeedConfig) -> Result<()> {
        let mut state = self.state();
        state.operations.push("PutBucketInventoryConfiguration");
        state.inventory_writes += 1;
        state
            .inventory
            .insert((bucket.to_string(), config.name.clone()), config.clone());
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: &str,
    ) -> Result<Vec<ObjectSummary>> {
        let mut state = self.state();
        state.operations.push("ListObjectsV2");
        state
            .list_calls
            .push((bucket.to_string(), prefix.to_string(), start_after.to_string()));

        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(MigrationError::remote("ListObjectsV2", "SlowDown"));
        }

        Ok(state
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix) && k.as_str() > start_after)
            .map(|((_, k), o)| ObjectSummary {
                key: k.clone(),
                last_modified: Some(o.last_modified),
            })
            .collect())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let mut state = self.state();
        state.operations.push("GetObject");
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| no_such_key("GetObject", bucket, key))
    }

    async fn head_object_etag(&self, bucket: &str, key: &str) -> Result<String> {
        let mut state = self.state();
        state.operations.push("HeadObject");
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.etag.clone())
            .ok_or_else(|| no_such_key("HeadObject", bucket, key))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        encryption: &Encryption,
    ) -> Result<()> {
        let mut state = self.state();
        state.operations.push("PutObject");
        let etag = state.next_etag();
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                last_modified: Utc::now(),
                etag,
                encryption: Some(encryption.clone()),
            },
        );
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        encryption: &Encryption,
    ) -> Result<String> {
        let mut state = self.state();
        state.operations.push("CreateMultipartUpload");
        state.multipart_started += 1;
        state.next_id += 1;
        let upload_id = format!("upload-{}", state.next_id);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                encryption: encryption.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        let mut state = self.state();
        state.operations.push("UploadPart");
        if state.failing_part == Some(part_number) {
            return Err(MigrationError::remote("UploadPart", "RequestTimeout"));
        }
        let etag = state.next_etag();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| MigrationError::remote("UploadPart", "NoSuchUpload"))?;
        upload.parts.insert(part_number, body);
        state.parts_uploaded += 1;
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut state = self.state();
        state.operations.push("CompleteMultipartUpload");
        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| MigrationError::remote("CompleteMultipartUpload", "NoSuchUpload"))?;
        if parts.len() != upload.parts.len() {
            return Err(MigrationError::remote(
                "CompleteMultipartUpload",
                "InvalidPart: part list does not match uploaded parts",
            ));
        }

        let mut body = BytesMut::new();
        for part in upload.parts.values() {
            body.extend_from_slice(part);
        }
        let etag = state.next_etag();
        state.objects.insert(
            (upload.bucket, upload.key),
            StoredObject {
                body: body.freeze(),
                last_modified: Utc::now(),
                etag,
                encryption: Some(upload.encryption),
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.state();
        state.operations.push("AbortMultipartUpload");
        state.multipart_aborted += 1;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        let mut state = self.state();
        state.operations.push("GetBucketVersioning");
        Ok(state
            .versioning
            .get(bucket)
            .copied()
            .unwrap_or(VersioningStatus::Unversioned))
    }

    async fn get_ownership_controls(&self, bucket: &str) -> Result<Vec<ObjectOwnership>> {
        let mut state = self.state();
        state.operations.push("GetBucketOwnershipControls");
        if state.ownership_fails {
            return Err(MigrationError::remote(
                "GetBucketOwnershipControls",
                "AccessDenied",
            ));
        }
        Ok(state.ownership.get(bucket).cloned().unwrap_or_default())
    }

    async fn select_object_content(
        &self,
        request: &SelectRequest,
    ) -> Result<Box<dyn SelectEventSource>> {
        let mut state = self.state();
        state.operations.push("SelectObjectContent");
        state.select_calls.push(request.clone());
        let events = state.select_outputs.get(&request.key).cloned().ok_or_else(|| {
            no_such_key("SelectObjectContent", &request.bucket, &request.key)
        })?;
        Ok(Box::new(ScriptedEvents::new(events)))
    }
}

// ── Job control ───────────────────────────────────────────────

/// `(status, succeeded, failed, total)` reported by one status lookup.
pub type ProgressStep = (JobStatus, i64, i64, i64);

#[derive(Default)]
struct JobsState {
    scripts: VecDeque<Vec<ProgressStep>>,
    running: HashMap<String, VecDeque<ProgressStep>>,
    created: Vec<BatchJobSpec>,
    describe_calls: usize,
    fail_describe: bool,
    fail_create: bool,
    next_id: u32,
}

impl JobsState {
    fn start(&mut self) -> String {
        self.next_id += 1;
        let job_id = format!("job-{:04}", self.next_id);
        let script = self
            .scripts
            .pop_front()
            .unwrap_or_else(|| vec![(JobStatus::Complete, 1, 0, 1)]);
        self.running.insert(job_id.clone(), script.into());
        job_id
    }
}

/// Batch job service held in memory.
///
/// Each created job consumes the next queued script; the last step of a
/// script repeats once it is reached. Jobs without a script complete with
/// one succeeded task.
#[derive(Default)]
pub struct FakeJobControl {
    state: Mutex<JobsState>,
}

impl FakeJobControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, JobsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the progress script of the next job.
    pub fn script(&self, steps: Vec<ProgressStep>) {
        self.state().scripts.push_back(steps);
    }

    /// Queue a job that completes immediately with the given counts.
    pub fn completes_with(&self, succeeded: i64, failed: i64, total: i64) {
        self.script(vec![(JobStatus::Complete, succeeded, failed, total)]);
    }

    /// Start a job without a spec, for polling tests.
    pub fn register(&self, _account_id: &str) -> String {
        self.state().start()
    }

    pub fn fail_describe(&self) {
        self.state().fail_describe = true;
    }

    pub fn fail_create(&self) {
        self.state().fail_create = true;
    }

    /// Specs in submission order.
    pub fn created_jobs(&self) -> Vec<BatchJobSpec> {
        self.state().created.clone()
    }

    pub fn describe_calls(&self) -> usize {
        self.state().describe_calls
    }
}

#[async_trait]
impl JobControlApi for FakeJobControl {
    async fn create_job(&self, spec: &BatchJobSpec) -> Result<String> {
        let mut state = self.state();
        if state.fail_create {
            return Err(MigrationError::remote("CreateJob", "AccessDenied"));
        }
        state.created.push(spec.clone());
        Ok(state.start())
    }

    async fn describe_job(&self, _account_id: &str, job_id: &str) -> Result<JobProgress> {
        let mut state = self.state();
        state.describe_calls += 1;
        if state.fail_describe {
            return Err(MigrationError::remote("DescribeJob", "InternalError"));
        }

        let steps = state
            .running
            .get_mut(job_id)
            .ok_or_else(|| MigrationError::remote("DescribeJob", format!("NotFound: {job_id}")))?;
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().copied()
        };
        let (status, succeeded, failed, total) =
            step.ok_or_else(|| MigrationError::remote("DescribeJob", "empty progress script"))?;

        Ok(JobProgress {
            job_id: job_id.to_string(),
            status,
            succeeded,
            failed,
            total,
        })
    }
}
