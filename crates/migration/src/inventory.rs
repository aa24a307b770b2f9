//! Reconciliation of the source bucket's inventory configuration.

use tracing::{info, instrument};

use bulkcopy_core::{
    bucket_from_arn, DateWindow, InventoryFeedConfig, ManifestLocation, MigrationError, Result,
};

use crate::store::ObjectStoreApi;

/// What a run has to do about the inventory configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryAction {
    /// Enabled configuration exists, nothing to write.
    Reuse(ManifestLocation),
    /// Owned configuration is missing or disabled and will be written.
    Provision(InventoryFeedConfig),
}

/// Where manifests of an existing configuration are delivered.
pub fn location_from_config(source_bucket: &str, config: &InventoryFeedConfig) -> ManifestLocation {
    let base = format!("{}/{}/", source_bucket, config.name);
    let prefix = match config.destination.prefix.as_deref().map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{p}/{base}"),
        _ => base,
    };

    ManifestLocation {
        bucket: bucket_from_arn(&config.destination.bucket_arn).to_string(),
        prefix,
        window: DateWindow::for_schedule(config.schedule),
    }
}

/// Location of a configuration written by [`InventoryFeedConfig::owned`].
pub fn owned_location(source_bucket: &str, name: &str) -> ManifestLocation {
    ManifestLocation {
        bucket: source_bucket.to_string(),
        prefix: format!("{source_bucket}/{name}/"),
        window: DateWindow::DAILY,
    }
}

/// Decide the action for `existing` without touching the store.
///
/// Only a configuration the tool owns may be created or enabled; anything else
/// must already be enabled.
pub fn decide(
    bucket: &str,
    name: &str,
    owned: bool,
    existing: Option<&InventoryFeedConfig>,
) -> Result<InventoryAction> {
    match existing {
        Some(config) if config.enabled => {
            Ok(InventoryAction::Reuse(location_from_config(bucket, config)))
        }
        Some(_) if !owned => Err(MigrationError::PreconditionFailed(format!(
            "inventory configuration '{name}' on bucket '{bucket}' is disabled"
        ))),
        None if !owned => Err(MigrationError::ConfigurationNotFound {
            bucket: bucket.to_string(),
            name: name.to_string(),
        }),
        _ => Ok(InventoryAction::Provision(InventoryFeedConfig::owned(bucket, name))),
    }
}

pub struct InventoryManager<'a> {
    store: &'a dyn ObjectStoreApi,
}

impl<'a> InventoryManager<'a> {
    pub fn new(store: &'a dyn ObjectStoreApi) -> Self {
        Self { store }
    }

    /// Read the configuration and decide what a run would do with it.
    pub async fn inspect(&self, bucket: &str, name: &str, owned: bool) -> Result<InventoryAction> {
        let existing = self.store.get_inventory_config(bucket, name).await?;
        decide(bucket, name, owned, existing.as_ref())
    }

    /// Make sure an enabled configuration exists and return where it delivers.
    #[instrument(skip_all, fields(bucket = %bucket, config = %name))]
    pub async fn ensure(&self, bucket: &str, name: &str, owned: bool) -> Result<ManifestLocation> {
        match self.inspect(bucket, name, owned).await? {
            InventoryAction::Reuse(location) => {
                info!(
                    destination = %location.bucket,
                    prefix = %location.prefix,
                    window = location.window.units(),
                    "Using existing inventory configuration"
                );
                Ok(location)
            }
            InventoryAction::Provision(config) => {
                self.store.put_inventory_config(bucket, &config).await?;
                info!("Inventory configuration created, first manifest may take up to 48 hours");
                Ok(owned_location(bucket, name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeObjectStore;
    use bulkcopy_core::{
        InventoryDestination, ScheduleFrequency, DEFAULT_INVENTORY_CONFIG_NAME,
    };

    fn existing(name: &str, enabled: bool, prefix: Option<&str>) -> InventoryFeedConfig {
        InventoryFeedConfig {
            name: name.to_string(),
            enabled,
            destination: InventoryDestination {
                bucket_arn: "arn:aws:s3:::inventory-dest".into(),
                prefix: prefix.map(str::to_string),
            },
            schedule: ScheduleFrequency::Weekly,
            all_versions: true,
            optional_fields: vec![],
        }
    }

    #[test]
    fn enabled_config_location_uses_destination_prefix() {
        let cfg = existing("team-inv", true, Some("reports/"));
        let location = location_from_config("src", &cfg);
        assert_eq!(location.bucket, "inventory-dest");
        assert_eq!(location.prefix, "reports/src/team-inv/");
        assert_eq!(location.window, DateWindow::WEEKLY);

        let cfg = existing("team-inv", true, None);
        assert_eq!(location_from_config("src", &cfg).prefix, "src/team-inv/");
    }

    #[test]
    fn unowned_configs_must_exist_and_be_enabled() {
        assert!(matches!(
            decide("src", "team-inv", false, None),
            Err(MigrationError::ConfigurationNotFound { .. })
        ));
        let disabled = existing("team-inv", false, None);
        assert!(matches!(
            decide("src", "team-inv", false, Some(&disabled)),
            Err(MigrationError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn owned_disabled_config_is_reprovisioned() {
        let disabled = existing(DEFAULT_INVENTORY_CONFIG_NAME, false, None);
        let action = decide("src", DEFAULT_INVENTORY_CONFIG_NAME, true, Some(&disabled)).unwrap();
        match action {
            InventoryAction::Provision(cfg) => {
                assert!(cfg.enabled);
                assert_eq!(cfg.destination.bucket_arn, "arn:aws:s3:::src");
                assert_eq!(cfg.schedule, ScheduleFrequency::Daily);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_owned_config_is_written_once() {
        let store = FakeObjectStore::new();
        let manager = InventoryManager::new(&store);

        let location = manager
            .ensure("src", DEFAULT_INVENTORY_CONFIG_NAME, true)
            .await
            .unwrap();
        assert_eq!(location, owned_location("src", DEFAULT_INVENTORY_CONFIG_NAME));
        assert_eq!(location.prefix, "src/bulk-copy-inventory/");
        assert_eq!(store.inventory_writes(), 1);

        // The second run finds the enabled configuration and writes nothing.
        let again = manager
            .ensure("src", DEFAULT_INVENTORY_CONFIG_NAME, true)
            .await
            .unwrap();
        assert_eq!(again, location);
        assert_eq!(store.inventory_writes(), 1);
    }

    #[tokio::test]
    async fn enabled_config_is_left_untouched() {
        let store = FakeObjectStore::new();
        store.set_inventory_config("src", existing("team-inv", true, Some("reports")));

        let location = InventoryManager::new(&store)
            .ensure("src", "team-inv", false)
            .await
            .unwrap();
        assert_eq!(location.bucket, "inventory-dest");
        assert_eq!(location.prefix, "reports/src/team-inv/");
        assert_eq!(store.inventory_writes(), 0);
    }
}
