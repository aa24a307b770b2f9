//! Shared fixtures: a seeded source bucket and fast engine tuning.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;

use bulkcopy_core::{
    EngineTuning, InventoryFeedConfig, MigrationArgs, MigrationConfig, VersioningStatus,
    DEFAULT_INVENTORY_CONFIG_NAME,
};
use bulkcopy_migration::store::SelectEvent;
use bulkcopy_migration::testing::FakeObjectStore;

pub const SOURCE: &str = "legacy-assets";
pub const DEST: &str = "new-assets";
pub const ACCOUNT: &str = "123456789012";
pub const ROLE: &str = "arn:aws:iam::123456789012:role/batch-copy";
pub const SCHEMA: &str =
    "Bucket, Key, VersionId, IsLatest, IsDeleteMarker, Size, LastModifiedDate";
pub const DATA_KEY: &str = "legacy-assets/bulk-copy-inventory/data/0b1c2d.csv.gz";

pub fn prefix() -> String {
    format!("{SOURCE}/{DEFAULT_INVENTORY_CONFIG_NAME}/")
}

/// Today's delivery key; always sorts after the listing start key.
pub fn manifest_key() -> String {
    format!("{}{}T01-00Z/manifest.json", prefix(), Utc::now().format("%Y-%m-%d"))
}

pub fn fast_tuning() -> EngineTuning {
    EngineTuning {
        manifest_retries: 24,
        job_warmup: Duration::from_millis(1),
        job_poll_interval: Duration::from_millis(1),
        upload_part_size: 5 * 1024 * 1024,
        job_priority: 10,
    }
}

pub fn args(latest_only: Option<&str>) -> MigrationArgs {
    MigrationArgs {
        region: "us-east-1".into(),
        account_id: ACCOUNT.into(),
        role_arn: ROLE.into(),
        source_bucket: SOURCE.into(),
        destination_bucket: Some(DEST.into()),
        inventory_config: DEFAULT_INVENTORY_CONFIG_NAME.into(),
        retry_interval: "1ms".into(),
        start: None,
        end: None,
        latest_only: latest_only.map(str::to_string),
        kms_id: Some("SSE-S3".into()),
        success_threshold: 0.8,
    }
}

pub fn config(latest_only: Option<&str>) -> MigrationConfig {
    MigrationConfig::from_args(args(latest_only), fast_tuning()).expect("valid test config")
}

/// Source bucket with an enabled owned inventory feed and no deliveries yet.
pub fn store_without_manifest(versioning: VersioningStatus) -> FakeObjectStore {
    let store = FakeObjectStore::new();
    store.set_versioning(SOURCE, versioning);
    store.set_inventory_config(
        SOURCE,
        InventoryFeedConfig::owned(SOURCE, DEFAULT_INVENTORY_CONFIG_NAME),
    );
    store
}

/// Source bucket with one delivered manifest and scripted select output.
pub fn seeded_store(versioning: VersioningStatus) -> FakeObjectStore {
    let store = store_without_manifest(versioning);
    let manifest = format!(
        r#"{{"sourceBucket":"{SOURCE}","fileFormat":"CSV","fileSchema":"{SCHEMA}","files":[{{"key":"{DATA_KEY}","size":2048}}]}}"#
    );
    store.insert_object(
        SOURCE,
        &manifest_key(),
        Utc::now() - chrono::Duration::hours(1),
        manifest,
    );
    store.set_select_output(
        DATA_KEY,
        vec![
            SelectEvent::Progress,
            SelectEvent::Records(Bytes::from_static(b"legacy-assets,img/a.png\n")),
            SelectEvent::Records(Bytes::from_static(b"legacy-assets,img/b.png\n")),
            SelectEvent::Stats,
            SelectEvent::End,
        ],
    );
    store
}
