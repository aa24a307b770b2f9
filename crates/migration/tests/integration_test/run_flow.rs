//! Full runs: planning, submission order, threshold gating.

use tokio_util::sync::CancellationToken;

use bulkcopy_core::{
    CannedAcl, JobStage, JobStatus, MigrationError, ObjectOwnership, ThresholdStage,
    VersioningStatus,
};
use bulkcopy_migration::testing::FakeJobControl;
use bulkcopy_migration::{Migration, PlanShape};

use crate::common::*;

#[tokio::test]
async fn test_non_versioned_run_meets_threshold() {
    let store = seeded_store(VersioningStatus::Unversioned);
    let jobs = FakeJobControl::new();
    jobs.script(vec![
        (JobStatus::Queued, 0, 0, 0),
        (JobStatus::Active, 2000, 100, 5582),
        (JobStatus::Complete, 5237, 345, 5582),
    ]);

    let report = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds");

    assert_eq!(report.plan, PlanShape::NoVersioning);
    assert_eq!(report.jobs.len(), 1);
    let ratio = report.success_ratio.expect("tasks were counted");
    assert!((ratio - 5237.0 / 5582.0).abs() < 1e-9);
    assert!(ratio > 0.93);

    let created = jobs.created_jobs();
    assert_eq!(created.len(), 1);
    let spec = &created[0];
    assert_eq!(spec.stage, JobStage::NonVersioned);
    assert!(!spec.versioned);
    assert_eq!(spec.target_arn(), "arn:aws:s3:::new-assets");
    assert_eq!(spec.manifest.key, "legacy-assets/bulk-copy-inventory/data/0b1c2d.csv");
    assert!(!spec.manifest.etag.is_empty());
    assert_eq!(spec.canned_acl, None);

    let selects = store.select_calls();
    assert_eq!(selects.len(), 1);
    assert_eq!(selects[0].expression, "SELECT s._1, s._2 FROM s3object s");
    assert_eq!(
        store.object_body(SOURCE, &spec.manifest.key).unwrap(),
        "legacy-assets,img/a.png\nlegacy-assets,img/b.png\n"
    );
}

#[tokio::test]
async fn test_versioned_gate_stops_latest_job() {
    let store = seeded_store(VersioningStatus::Enabled);
    let jobs = FakeJobControl::new();
    jobs.completes_with(1, 9, 10);
    jobs.completes_with(100, 0, 100);

    let err = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .unwrap_err();

    match err {
        MigrationError::ThresholdNotMet {
            stage,
            achieved,
            required,
        } => {
            assert_eq!(stage, ThresholdStage::NonLatestGate);
            assert!((achieved - 0.1).abs() < 1e-9);
            assert!((required - 0.8).abs() < 1e-9);
        }
        other => panic!("unexpected error: {other}"),
    }

    let created = jobs.created_jobs();
    assert_eq!(created.len(), 1, "latest job must never be submitted");
    assert_eq!(created[0].stage, JobStage::NonLatest);
}

#[tokio::test]
async fn test_empty_non_latest_job_does_not_block_latest() {
    let store = seeded_store(VersioningStatus::Enabled);
    let jobs = FakeJobControl::new();
    jobs.completes_with(0, 0, 0);
    jobs.completes_with(100, 0, 100);

    let report = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds");

    let stages: Vec<JobStage> = jobs.created_jobs().iter().map(|s| s.stage).collect();
    assert_eq!(stages, vec![JobStage::NonLatest, JobStage::Latest]);
    assert_eq!(report.success_ratio, Some(1.0));
}

#[tokio::test]
async fn test_run_without_any_tasks_succeeds() {
    let store = seeded_store(VersioningStatus::Unversioned);
    let jobs = FakeJobControl::new();
    jobs.completes_with(0, 0, 0);

    let report = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds");

    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.success_ratio, None);
}

#[tokio::test]
async fn test_failed_job_creation_aborts_run() {
    let store = seeded_store(VersioningStatus::Enabled);
    let jobs = FakeJobControl::new();
    jobs.fail_create();

    let err = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::Remote {
            operation: "CreateJob",
            ..
        }
    ));
    assert!(jobs.created_jobs().is_empty());
    assert_eq!(jobs.describe_calls(), 0);
}

#[tokio::test]
async fn test_dual_run_submits_non_latest_first() {
    let store = seeded_store(VersioningStatus::Enabled);
    let jobs = FakeJobControl::new();
    jobs.completes_with(10, 0, 10);
    jobs.completes_with(90, 10, 100);

    let report = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds");

    assert_eq!(report.plan, PlanShape::DualOrdered);
    let ratio = report.success_ratio.expect("tasks were counted");
    assert!((ratio - 100.0 / 110.0).abs() < 1e-9);

    let created = jobs.created_jobs();
    let stages: Vec<JobStage> = created.iter().map(|s| s.stage).collect();
    assert_eq!(stages, vec![JobStage::NonLatest, JobStage::Latest]);
    assert!(created.iter().all(|s| s.versioned));
    assert_ne!(created[0].manifest.key, created[1].manifest.key);
    assert_ne!(created[0].manifest.etag, created[1].manifest.etag);

    let expressions: Vec<String> = store
        .select_calls()
        .into_iter()
        .map(|r| r.expression)
        .collect();
    assert_eq!(
        expressions,
        vec![
            "SELECT s._1, s._2 FROM s3object s WHERE s._4 = 'false'".to_string(),
            "SELECT s._1, s._2 FROM s3object s WHERE s._4 = 'true'".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_overall_ratio_sums_task_counts() {
    let store = seeded_store(VersioningStatus::Enabled);
    let jobs = FakeJobControl::new();
    jobs.completes_with(8, 2, 10);
    jobs.completes_with(15, 5, 20);

    let err = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .unwrap_err();

    match err {
        MigrationError::ThresholdNotMet {
            stage, achieved, ..
        } => {
            assert_eq!(stage, ThresholdStage::Overall);
            assert!((achieved - 23.0 / 30.0).abs() < 1e-9);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(jobs.created_jobs().len(), 2);
}

#[tokio::test]
async fn test_latest_only_runs_single_job() {
    let store = seeded_store(VersioningStatus::Suspended);
    let jobs = FakeJobControl::new();

    let report = Migration::new(&store, &jobs)
        .run(&config(Some("YES")))
        .await
        .expect("run succeeds");

    assert_eq!(report.plan, PlanShape::LatestOnly);
    let created = jobs.created_jobs();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].stage, JobStage::Latest);
    assert_eq!(store.select_calls().len(), 1);
}

#[tokio::test]
async fn test_non_latest_only_runs_single_job() {
    let store = seeded_store(VersioningStatus::Enabled);
    let jobs = FakeJobControl::new();

    let report = Migration::new(&store, &jobs)
        .run(&config(Some("no")))
        .await
        .expect("run succeeds");

    assert_eq!(report.plan, PlanShape::NonLatestOnly);
    let created = jobs.created_jobs();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].stage, JobStage::NonLatest);
    assert!(created[0].manifest.key.ends_with(".noncurrent"));
}

#[tokio::test]
async fn test_enforced_ownership_adds_full_control_acl() {
    let store = seeded_store(VersioningStatus::Unversioned);
    store.set_ownership(DEST, vec![ObjectOwnership::BucketOwnerEnforced]);
    let jobs = FakeJobControl::new();

    Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds");

    assert_eq!(
        jobs.created_jobs()[0].canned_acl,
        Some(CannedAcl::BucketOwnerFullControl)
    );
}

#[tokio::test]
async fn test_ownership_lookup_failure_is_not_fatal() {
    let store = seeded_store(VersioningStatus::Unversioned);
    store.fail_ownership_lookup();
    let jobs = FakeJobControl::new();

    Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .expect("run succeeds");

    assert_eq!(jobs.created_jobs()[0].canned_acl, None);
}

#[tokio::test]
async fn test_failed_job_status_lookup_aborts_run() {
    let store = seeded_store(VersioningStatus::Unversioned);
    let jobs = FakeJobControl::new();
    jobs.fail_describe();

    let err = Migration::new(&store, &jobs)
        .run(&config(None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Remote {
            operation: "DescribeJob",
            ..
        }
    ));
}

#[tokio::test]
async fn test_missing_unowned_config_fails_before_writing() {
    let store = seeded_store(VersioningStatus::Enabled);
    let jobs = FakeJobControl::new();
    let mut args = args(None);
    args.inventory_config = "team-inventory".into();
    let config = bulkcopy_core::MigrationConfig::from_args(args, fast_tuning()).unwrap();

    let err = Migration::new(&store, &jobs).run(&config).await.unwrap_err();
    assert!(matches!(err, MigrationError::ConfigurationNotFound { .. }));
    assert!(store.write_operations().is_empty());
    assert!(jobs.created_jobs().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_stops_immediately() {
    let store = seeded_store(VersioningStatus::Unversioned);
    let jobs = FakeJobControl::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Migration::new(&store, &jobs)
        .with_cancellation(cancel)
        .run(&config(None))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Cancelled));
    assert!(jobs.created_jobs().is_empty());
}
