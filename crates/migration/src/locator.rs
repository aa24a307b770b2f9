//! Discovery of the newest inventory manifest.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use bulkcopy_core::{
    ManifestLocation, ManifestReference, MigrationError, ObjectSummary, Result, MANIFEST_SUFFIX,
};

use crate::cancel;
use crate::store::ObjectStoreApi;

/// How long and how often to wait for the first manifest to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Lookups after the initial one.
    pub retries: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Newest manifest among `objects` modified after `window_start`.
pub fn select_latest(
    bucket: &str,
    objects: &[ObjectSummary],
    window_start: DateTime<Utc>,
) -> Option<ManifestReference> {
    objects
        .iter()
        .filter(|o| o.key.ends_with(MANIFEST_SUFFIX))
        .filter_map(|o| o.last_modified.map(|ts| (o, ts)))
        .filter(|(_, ts)| *ts > window_start)
        .max_by_key(|(_, ts)| *ts)
        .map(|(o, ts)| ManifestReference {
            bucket: bucket.to_string(),
            key: o.key.clone(),
            last_modified: ts,
        })
}

pub struct ManifestLocator<'a> {
    store: &'a dyn ObjectStoreApi,
}

impl<'a> ManifestLocator<'a> {
    pub fn new(store: &'a dyn ObjectStoreApi) -> Self {
        Self { store }
    }

    /// One lookup relative to the current time.
    pub async fn find_latest(&self, location: &ManifestLocation) -> Result<Option<ManifestReference>> {
        self.find_latest_at(location, Utc::now()).await
    }

    /// One lookup relative to `now`. Listing failures surface as errors, not as `None`.
    pub async fn find_latest_at(
        &self,
        location: &ManifestLocation,
        now: DateTime<Utc>,
    ) -> Result<Option<ManifestReference>> {
        let window_start = location.window.start(now);
        let start_after = location.start_after(window_start);

        let objects = self
            .store
            .list_objects(&location.bucket, &location.prefix, &start_after)
            .await?;
        debug!(
            bucket = %location.bucket,
            prefix = %location.prefix,
            start_after = %start_after,
            listed = objects.len(),
            "Listed inventory objects"
        );

        Ok(select_latest(&location.bucket, &objects, window_start))
    }

    /// Look up the manifest, waiting `policy.interval` between attempts.
    ///
    /// A recoverable listing failure consumes an attempt like an empty result.
    /// Gives up with [`MigrationError::ManifestNotFound`] after
    /// [`RetryPolicy::max_attempts`] lookups.
    #[instrument(skip_all, fields(bucket = %location.bucket, prefix = %location.prefix))]
    pub async fn wait_for_manifest(
        &self,
        location: &ManifestLocation,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ManifestReference> {
        let max_attempts = policy.max_attempts();

        for attempt in 1..=max_attempts {
            match cancel::cancellable(cancel, self.find_latest(location)).await {
                Ok(Some(manifest)) => {
                    info!(
                        key = %manifest.key,
                        last_modified = %manifest.last_modified,
                        attempt,
                        "Found inventory manifest"
                    );
                    return Ok(manifest);
                }
                Ok(None) => {
                    info!(attempt, max_attempts, "No inventory manifest delivered yet");
                }
                Err(e) if e.is_recoverable() => {
                    warn!(attempt, max_attempts, error = %e, "Manifest lookup failed");
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                info!(
                    retry_in_secs = policy.interval.as_secs(),
                    "Waiting before next manifest lookup"
                );
                cancel::sleep(cancel, policy.interval).await?;
            }
        }

        Err(MigrationError::ManifestNotFound {
            attempts: max_attempts,
        })
    }
}
