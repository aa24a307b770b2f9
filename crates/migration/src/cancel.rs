//! Cooperative cancellation for remote calls and waits.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bulkcopy_core::{MigrationError, Result};

/// Run `fut` unless `cancel` fires first; the in-flight call is dropped on cancellation.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MigrationError::Cancelled),
        res = fut => res,
    }
}

/// Sleep for `duration`, waking early with [`MigrationError::Cancelled`].
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MigrationError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
