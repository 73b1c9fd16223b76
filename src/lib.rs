pub mod blocks;
pub mod config;
pub mod engine;
pub mod error;
pub mod notion;
pub mod progress;
pub mod report;
pub mod vault;

pub use config::{AppConfig, MigrationOptions};
pub use engine::{MigrationEngine, MigrationResult, MigrationSummary};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
