//! Bulk-copy migration engine.
//!
//! A run reconciles the source bucket's inventory configuration, waits for
//! the newest inventory manifest, derives one filtered copy manifest per
//! batch job and submits the jobs, holding the run to a success threshold.

pub mod aws;
pub mod cancel;
pub mod dry_run;
pub mod engine;
pub mod expression;
pub mod inventory;
pub mod locator;
pub mod manifest;
pub mod orchestrator;
pub mod poller;
pub mod select_reader;
pub mod store;
pub mod testing;
pub mod threshold;
pub mod upload;

pub use aws::AwsClients;
pub use dry_run::{dry_run, DryRunReport};
pub use engine::{Migration, MigrationReport};
pub use orchestrator::{JobPlan, PlanShape};
pub use store::{JobControlApi, ObjectStoreApi};
