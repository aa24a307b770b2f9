//! Success ratio of finished batch jobs.

use tracing::{info, warn};

use bulkcopy_core::{JobProgress, MigrationError, Result, ThresholdStage};

/// Succeeded tasks over total tasks across `jobs`.
///
/// Jobs that report no tasks are left out. `None` when no job had tasks.
pub fn success_ratio<'a, I>(jobs: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a JobProgress>,
{
    let mut succeeded = 0i64;
    let mut total = 0i64;
    for job in jobs {
        if job.total <= 0 {
            warn!(job_id = %job.job_id, "Job reported no tasks, excluded from success ratio");
            continue;
        }
        succeeded += job.succeeded;
        total += job.total;
    }

    if total == 0 {
        None
    } else {
        Some(succeeded as f64 / total as f64)
    }
}

/// Check the ratio of `jobs` against `required` at `stage`.
///
/// With no tasks to count there is nothing to judge, so the check is skipped
/// and `Ok(None)` returned.
pub fn enforce_threshold<'a, I>(stage: ThresholdStage, jobs: I, required: f64) -> Result<Option<f64>>
where
    I: IntoIterator<Item = &'a JobProgress>,
{
    match success_ratio(jobs) {
        Some(achieved) => {
            ensure_threshold(stage, achieved, required)?;
            Ok(Some(achieved))
        }
        None => {
            info!(stage = %stage, "No copy tasks to evaluate, skipping success threshold");
            Ok(None)
        }
    }
}

/// Fail with [`MigrationError::ThresholdNotMet`] when `achieved < required`.
pub fn ensure_threshold(stage: ThresholdStage, achieved: f64, required: f64) -> Result<()> {
    if achieved < required {
        return Err(MigrationError::ThresholdNotMet {
            stage,
            achieved,
            required,
        });
    }
    info!(stage = %stage, achieved, required, "Success threshold met");
    Ok(())
}
