//! Versioned indexed databases (object stores + secondary indexes).
//!
//! # Responsibility
//! - Declare database layouts as ordered, named, versioned migrations.
//! - Open databases at a requested version, upgrading additively.
//! - Serve record reads/writes and secondary-index lookups.
//!
//! # Invariants
//! - Upgrades only create missing stores and indexes; nothing is dropped or
//!   rewritten, so stored records survive every upgrade.
//! - A connection is handed out only after every store and index expected at
//!   its version has been verified present.
//! - Persisted version never decreases.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod connection;
mod manager;
pub mod schema;

pub use connection::{IndexedConnection, MAX_KEY};
pub use manager::{ConnectionState, OpenReport, SchemaVersionManager};
pub use schema::{DatabaseSchema, Migration, SchemaLayout, SchemaStep};

pub type IndexedResult<T> = Result<T, IndexedError>;

#[derive(Debug)]
pub enum IndexedError {
    /// The database could not be opened; the connection is unusable.
    SchemaOpenFailed { name: String, message: String },
    /// Upgrade finished its steps but expected pieces are missing. Rolled back.
    UpgradeIncomplete {
        name: String,
        version: u32,
        missing: Vec<String>,
    },
    /// Requested version is lower than the persisted one.
    VersionDowngrade {
        name: String,
        requested: u32,
        persisted: u32,
    },
    /// Requested version is zero or beyond the latest declared migration.
    UnsupportedVersion {
        name: String,
        requested: u32,
        latest: u32,
    },
    /// Migration list is not strictly increasing or names invalid pieces.
    InvalidSchema(String),
    InvalidIdentifier(String),
    UnknownObjectStore(String),
    UnknownIndex { store: String, index: String },
    /// Key or unique-index collision.
    ConstraintViolation { store: String, detail: String },
    InvalidData(String),
    Db(DbError),
}

impl Display for IndexedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaOpenFailed { name, message } => {
                write!(f, "failed to open indexed database `{name}`: {message}")
            }
            Self::UpgradeIncomplete {
                name,
                version,
                missing,
            } => write!(
                f,
                "upgrade of `{name}` to version {version} is incomplete; missing: {}",
                missing.join(", ")
            ),
            Self::VersionDowngrade {
                name,
                requested,
                persisted,
            } => write!(
                f,
                "cannot open `{name}` at version {requested}; persisted version is {persisted}"
            ),
            Self::UnsupportedVersion {
                name,
                requested,
                latest,
            } => write!(
                f,
                "version {requested} of `{name}` is not supported (latest {latest})"
            ),
            Self::InvalidSchema(message) => write!(f, "invalid schema: {message}"),
            Self::InvalidIdentifier(value) => write!(f, "invalid identifier `{value}`"),
            Self::UnknownObjectStore(store) => write!(f, "object store not found: {store}"),
            Self::UnknownIndex { store, index } => {
                write!(f, "index `{index}` not found on object store `{store}`")
            }
            Self::ConstraintViolation { store, detail } => {
                write!(f, "constraint violation in `{store}`: {detail}")
            }
            Self::InvalidData(message) => write!(f, "invalid indexed record: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IndexedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for IndexedError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for IndexedError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
