use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};

/// Inventory configuration name the tool owns and may create or enable.
pub const DEFAULT_INVENTORY_CONFIG_NAME: &str = "bulk-copy-inventory";

/// Key suffix of the manifest object written for every inventory delivery.
pub const MANIFEST_SUFFIX: &str = "manifest.json";

/// Suffix of the compressed inventory data files.
pub const COMPRESSION_SUFFIX: &str = ".gz";

/// Convert a bucket or `bucket/key` path to an S3 ARN.
pub fn s3_arn(path: &str) -> String {
    format!("arn:aws:s3:::{path}")
}

/// Bucket name of an S3 ARN (everything after the last `:`).
pub fn bucket_from_arn(arn: &str) -> &str {
    match arn.rfind(':') {
        Some(idx) => &arn[idx + 1..],
        None => arn,
    }
}

// ── Inventory feed ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryField {
    Size,
    LastModifiedDate,
    ReplicationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDestination {
    /// Destination bucket ARN (`arn:aws:s3:::bucket`).
    pub bucket_arn: String,
    pub prefix: Option<String>,
}

/// Inventory configuration of a bucket, as far as the engine cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFeedConfig {
    pub name: String,
    pub enabled: bool,
    pub destination: InventoryDestination,
    pub schedule: ScheduleFrequency,
    pub all_versions: bool,
    pub optional_fields: Vec<InventoryField>,
}

impl InventoryFeedConfig {
    /// Configuration written when the tool owns the feed: CSV, every object
    /// version, daily, delivered into the source bucket itself.
    pub fn owned(bucket: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            destination: InventoryDestination {
                bucket_arn: s3_arn(bucket),
                prefix: None,
            },
            schedule: ScheduleFrequency::Daily,
            all_versions: true,
            optional_fields: vec![
                InventoryField::LastModifiedDate,
                InventoryField::ReplicationStatus,
                // Batch copy has a 5 GB object limit, size lets callers filter those out
                InventoryField::Size,
            ],
        }
    }
}

// ── Manifest discovery ────────────────────────────────────────

/// Signed lookback window, counted in 48-hour units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow(pub i32);

impl DateWindow {
    pub const UNIT_HOURS: i64 = 48;

    pub const DAILY: DateWindow = DateWindow(-1);
    pub const WEEKLY: DateWindow = DateWindow(-8);

    pub fn for_schedule(schedule: ScheduleFrequency) -> Self {
        match schedule {
            ScheduleFrequency::Weekly => Self::WEEKLY,
            ScheduleFrequency::Daily => Self::DAILY,
        }
    }

    pub fn units(&self) -> i32 {
        self.0
    }

    /// Earliest last-modified time a manifest may carry to be considered.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(i64::from(self.0) * Self::UNIT_HOURS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLocation {
    pub bucket: String,
    pub prefix: String,
    pub window: DateWindow,
}

impl ManifestLocation {
    /// Listing start key: the prefix followed by the window start date.
    pub fn start_after(&self, window_start: DateTime<Utc>) -> String {
        format!("{}{}", self.prefix, window_start.format("%Y-%m-%d"))
    }
}

/// One entry of an object listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestReference {
    /// Bucket the inventory is delivered to; data files live beside the manifest.
    pub bucket: String,
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub key: String,
}

/// Inventory `manifest.json`. Only the schema and the data file list are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "fileSchema")]
    pub file_schema: String,
    pub files: Vec<ManifestFile>,
}

impl ManifestDocument {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| MigrationError::MalformedManifest(e.to_string()))
    }

    /// Key of the first data file; later entries are not consumed.
    pub fn first_data_key(&self) -> Result<&str> {
        self.files
            .first()
            .map(|f| f.key.as_str())
            .ok_or_else(|| MigrationError::MalformedManifest("manifest lists no data files".into()))
    }
}

// ── Filtering ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatestOnly {
    Yes,
    No,
}

impl LatestOnly {
    /// Case-insensitive `yes`/`no`.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "YES" => Ok(LatestOnly::Yes),
            "NO" => Ok(LatestOnly::No),
            _ => Err(MigrationError::InvalidArgument(format!(
                "latest-only value '{value}' is not valid, expected Yes or No"
            ))),
        }
    }
}

/// Server-side encryption applied to uploaded filtered manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encryption {
    S3Managed,
    Kms { key_id: String },
}

impl Encryption {
    pub const S3_MANAGED_LABEL: &'static str = "SSE-S3";

    pub fn from_key_id(key_id: &str) -> Self {
        let trimmed = key_id.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(Self::S3_MANAGED_LABEL) {
            Encryption::S3Managed
        } else {
            Encryption::Kms {
                key_id: trimmed.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub latest_only: Option<LatestOnly>,
    pub encryption: Encryption,
}

impl FilterCriteria {
    pub fn with_latest_only(&self, latest_only: LatestOnly) -> Self {
        Self {
            latest_only: Some(latest_only),
            ..self.clone()
        }
    }
}

// ── Batch jobs ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning was never configured on the bucket.
    Unversioned,
    Enabled,
    Suspended,
}

impl VersioningStatus {
    /// Suspended buckets may still hold older versions, so only a bucket that
    /// was never versioned is treated as non-versioned.
    pub fn versioning_disabled(&self) -> bool {
        matches!(self, VersioningStatus::Unversioned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectOwnership {
    BucketOwnerEnforced,
    BucketOwnerPreferred,
    ObjectWriter,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CannedAcl {
    BucketOwnerFullControl,
}

/// Which slice of the source a job copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    NonVersioned,
    NonLatest,
    Latest,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::NonVersioned => f.write_str("non-versioned objects"),
            JobStage::NonLatest => f.write_str("non-latest versions"),
            JobStage::Latest => f.write_str("latest versions"),
        }
    }
}

/// Run-level job inputs known before any manifest has been filtered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDraft {
    pub account_id: String,
    pub role_arn: String,
    pub source_bucket: String,
    pub target_bucket: String,
    pub versioning_disabled: bool,
    pub priority: i32,
}

/// Filtered manifest uploaded for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedManifest {
    pub bucket: String,
    pub key: String,
    pub etag: String,
}

impl UploadedManifest {
    pub fn arn(&self) -> String {
        s3_arn(&format!("{}/{}", self.bucket, self.key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobSpec {
    pub account_id: String,
    pub role_arn: String,
    pub source_bucket: String,
    pub target_bucket: String,
    pub manifest: UploadedManifest,
    pub versioned: bool,
    pub stage: JobStage,
    pub canned_acl: Option<CannedAcl>,
    pub priority: i32,
}

impl BatchJobSpec {
    pub fn target_arn(&self) -> String {
        s3_arn(&self.target_bucket)
    }

    pub fn description(&self) -> String {
        format!(
            "bulk copy of {} from {} to {}",
            self.stage, self.source_bucket, self.target_bucket
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Active,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// No further status changes occur once a job is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub status: JobStatus,
    pub succeeded: i64,
    pub failed: i64,
    pub total: i64,
}
