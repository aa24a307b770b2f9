use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use bulkcopy_core::config::DEFAULT_SUCCESS_THRESHOLD;
use bulkcopy_core::{MigrationArgs, DEFAULT_INVENTORY_CONFIG_NAME};

/// Copy every object of an S3 bucket into another with S3 Batch Operations.
///
/// The copy is driven by the source bucket's inventory report: each run
/// filters the newest inventory into a batch manifest and submits copy jobs.
#[derive(Parser, Debug)]
#[command(name = "bulk-copy", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate access and show what a run would do, without writing anything.
    DryRun(DryRunArgs),
    /// Filter the latest inventory and copy the objects to the destination.
    Run(RunArgs),
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// AWS region of the source bucket.
    #[arg(long, env = "BULKCOPY_REGION")]
    pub region: String,

    /// Bucket to copy from.
    #[arg(long = "sourcebucket", env = "BULKCOPY_SOURCE_BUCKET")]
    pub source_bucket: String,

    /// Account id the batch jobs run under (12 digits).
    #[arg(long = "account", env = "BULKCOPY_ACCOUNT")]
    pub account_id: String,

    /// IAM role ARN assumed by the batch jobs.
    #[arg(long = "role", env = "BULKCOPY_ROLE")]
    pub role_arn: String,

    /// Inventory configuration name. Only the default one is created or
    /// enabled automatically.
    #[arg(
        long = "inventoryconfig",
        env = "BULKCOPY_INVENTORY_CONFIG",
        default_value = DEFAULT_INVENTORY_CONFIG_NAME
    )]
    pub inventory_config: String,
}

/// Which object versions to copy.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Without `--end`, copy objects last modified before this time; with it,
    /// the lower bound of the range (YYYY-MM-DD HH:MM:SS).
    #[arg(long)]
    pub start: Option<String>,

    /// Without `--start`, copy objects last modified after this time; with it,
    /// the upper bound of the range (YYYY-MM-DD HH:MM:SS).
    #[arg(long)]
    pub end: Option<String>,

    /// `yes` copies only current versions, `no` only older versions.
    /// Unset copies older versions first, then current ones.
    #[arg(long = "latest-only")]
    pub latest_only: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Bucket to copy into.
    #[arg(long = "destinationbucket", env = "BULKCOPY_DESTINATION_BUCKET")]
    pub destination_bucket: String,

    /// Wait between manifest lookups while the first inventory is generated.
    #[arg(long, default_value = "1h")]
    pub retry: String,

    /// KMS key for the filtered manifests, or SSE-S3.
    #[arg(long = "kms-id", default_value = "SSE-S3")]
    pub kms_id: String,

    /// Fraction of copy tasks that must succeed.
    #[arg(long, default_value_t = DEFAULT_SUCCESS_THRESHOLD)]
    pub threshold: f64,
}

#[derive(Args, Debug, Clone)]
pub struct DryRunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Destination bucket whose ownership settings should be checked.
    #[arg(long = "destinationbucket", env = "BULKCOPY_DESTINATION_BUCKET")]
    pub destination_bucket: Option<String>,

    /// Local manifest.json to preview the select expressions against.
    #[arg(long = "local-inventory")]
    pub local_inventory: Option<PathBuf>,
}

impl CommonArgs {
    fn migration_args(&self, filters: &FilterArgs) -> MigrationArgs {
        MigrationArgs {
            region: self.region.clone(),
            account_id: self.account_id.clone(),
            role_arn: self.role_arn.clone(),
            source_bucket: self.source_bucket.clone(),
            inventory_config: self.inventory_config.clone(),
            start: filters.start.clone(),
            end: filters.end.clone(),
            latest_only: filters.latest_only.clone(),
            ..MigrationArgs::default()
        }
    }
}

impl RunArgs {
    pub fn migration_args(&self) -> MigrationArgs {
        MigrationArgs {
            destination_bucket: Some(self.destination_bucket.clone()),
            retry_interval: self.retry.clone(),
            kms_id: Some(self.kms_id.clone()),
            success_threshold: self.threshold,
            ..self.common.migration_args(&self.filters)
        }
    }
}

impl DryRunArgs {
    pub fn migration_args(&self) -> MigrationArgs {
        MigrationArgs {
            destination_bucket: self.destination_bucket.clone(),
            retry_interval: "0".into(),
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            ..self.common.migration_args(&self.filters)
        }
    }
}
