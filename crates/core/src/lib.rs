pub mod config;
pub mod error;
pub mod model;

pub use config::{EngineTuning, MigrationArgs, MigrationConfig};
pub use error::*;
pub use model::*;
