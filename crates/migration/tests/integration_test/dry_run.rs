//! Dry runs read state and never write.

use std::path::PathBuf;

use bulkcopy_core::{CannedAcl, JobStage, MigrationError, ObjectOwnership, VersioningStatus};
use bulkcopy_migration::dry_run::InventoryReadiness;
use bulkcopy_migration::testing::FakeObjectStore;
use bulkcopy_migration::{dry_run, PlanShape};

use crate::common::*;

fn local_manifest(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("bulkcopy-{}-{name}.json", std::process::id()));
    let body = format!(r#"{{"fileSchema":"{SCHEMA}","files":[{{"key":"{DATA_KEY}"}}]}}"#);
    std::fs::write(&path, body).expect("write local manifest");
    path
}

#[tokio::test]
async fn test_dry_run_reports_without_writing() {
    let store = seeded_store(VersioningStatus::Enabled);
    store.set_ownership(DEST, vec![ObjectOwnership::BucketOwnerEnforced]);
    let path = local_manifest("versioned");

    let report = dry_run(&store, &config(None), Some(&path))
        .await
        .expect("dry run succeeds");
    std::fs::remove_file(&path).ok();

    assert_eq!(report.versioning, VersioningStatus::Enabled);
    assert_eq!(report.inventory, InventoryReadiness::Ready);
    assert_eq!(report.manifest.as_ref().map(|m| m.key.clone()), Some(manifest_key()));
    assert_eq!(report.plan, PlanShape::DualOrdered);

    let destination = report.destination.as_ref().expect("destination checked");
    assert!(destination.readable);
    assert_eq!(destination.canned_acl, Some(CannedAcl::BucketOwnerFullControl));

    assert_eq!(
        report.expressions,
        vec![
            (
                JobStage::NonLatest,
                "SELECT s._1, s._2 FROM s3object s WHERE s._4 = 'false'".to_string()
            ),
            (
                JobStage::Latest,
                "SELECT s._1, s._2 FROM s3object s WHERE s._4 = 'true'".to_string()
            ),
        ]
    );

    assert!(store.write_operations().is_empty());
    assert!(store.select_calls().is_empty());
}

#[tokio::test]
async fn test_dry_run_reports_pending_provisioning() {
    let store = FakeObjectStore::new();
    let mut config = config(None);
    config.destination_bucket = None;

    let report = dry_run(&store, &config, None).await.expect("dry run succeeds");

    assert_eq!(report.inventory, InventoryReadiness::WouldProvision);
    assert_eq!(report.location.bucket, SOURCE);
    assert!(report.manifest.is_none());
    assert!(report.destination.is_none());
    assert!(report.expressions.is_empty());
    assert!(store.list_calls().is_empty());
    assert!(store.write_operations().is_empty());
}

#[tokio::test]
async fn test_dry_run_rejects_disabled_unowned_config() {
    let store = FakeObjectStore::new();
    let mut feed = bulkcopy_core::InventoryFeedConfig::owned(SOURCE, "team-inventory");
    feed.enabled = false;
    store.set_inventory_config(SOURCE, feed);

    let mut args = args(None);
    args.inventory_config = "team-inventory".into();
    let config = bulkcopy_core::MigrationConfig::from_args(args, fast_tuning()).unwrap();

    let err = dry_run(&store, &config, None).await.unwrap_err();
    assert!(matches!(err, MigrationError::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_dry_run_rejects_unreadable_local_manifest() {
    let store = seeded_store(VersioningStatus::Unversioned);
    let missing = std::env::temp_dir().join("bulkcopy-does-not-exist/manifest.json");

    let err = dry_run(&store, &config(None), Some(&missing))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::InvalidArgument(_)));
}
