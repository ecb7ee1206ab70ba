//! Local persistence core for the physiotherapy practice tool.
//! Collections, typed repositories, first-run seeding, the versioned
//! `fisioterapiaDB` indexed store and snapshot export/import.

pub mod app;
pub mod config;
pub mod db;
pub mod indexed;
pub mod logging;
pub mod model;
pub mod repo;
pub mod seed;
pub mod service;
pub mod store;

pub use app::{CollectionStat, FisioStore, OpenError};
pub use config::{ConfigError, CoreConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use repo::{RepoError, RepoResult};
pub use seed::SeedOutcome;
pub use service::snapshot_service::{ImportReport, SnapshotDocument, SnapshotError};
pub use store::{Collection, MemoryEngine, SqliteEngine, Storage, StoreError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
