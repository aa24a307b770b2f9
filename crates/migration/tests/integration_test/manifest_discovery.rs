//! Inventory reconciliation and manifest retry behaviour of full runs.

use bulkcopy_core::{MigrationError, VersioningStatus, DEFAULT_INVENTORY_CONFIG_NAME};
use bulkcopy_migration::testing::{FakeJobControl, FakeObjectStore};
use bulkcopy_migration::Migration;

use crate::common::*;

#[tokio::test]
async fn test_no_manifest_exhausts_all_attempts() {
    let store = store_without_manifest(VersioningStatus::Unversioned);
    let jobs = FakeJobControl::new();

    let err = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::ManifestNotFound { attempts: 25 }));
    assert_eq!(store.list_calls().len(), 25);
    assert!(store.select_calls().is_empty());
    assert!(jobs.created_jobs().is_empty());
}

#[tokio::test]
async fn test_listing_errors_consume_attempts() {
    let store = seeded_store(VersioningStatus::Unversioned);
    store.fail_next_lists(3);
    let jobs = FakeJobControl::new();

    Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds after transient listing failures");

    assert_eq!(store.list_calls().len(), 4);
}

#[tokio::test]
async fn test_missing_owned_config_is_created_then_waited_on() {
    let store = FakeObjectStore::new();
    let jobs = FakeJobControl::new();
    let mut config = config(None);
    config.tuning.manifest_retries = 2;

    let err = Migration::new(&store, &jobs).run(&config).await.unwrap_err();

    assert!(matches!(err, MigrationError::ManifestNotFound { attempts: 3 }));
    assert_eq!(store.inventory_writes(), 1);
    assert_eq!(store.write_operations(), vec!["PutBucketInventoryConfiguration"]);

    let listings = store.list_calls();
    assert_eq!(listings.len(), 3);
    let (bucket, prefix, start_after) = &listings[0];
    assert_eq!(bucket, SOURCE);
    assert_eq!(prefix, &format!("{SOURCE}/{DEFAULT_INVENTORY_CONFIG_NAME}/"));
    assert!(start_after.starts_with(prefix.as_str()));
}

#[tokio::test]
async fn test_enabled_config_is_never_rewritten() {
    let store = seeded_store(VersioningStatus::Unversioned);
    let jobs = FakeJobControl::new();

    Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds");

    assert_eq!(store.inventory_writes(), 0);
}
