//! Collection store contracts and storage engines.
//!
//! # Responsibility
//! - Define the async key/value contract over one named collection.
//! - Provide SQLite-backed and in-memory engines.
//! - Hand out [`Collection`] handles that carry a per-name mutual-exclusion
//!   token for read-modify-write sequences.
//!
//! # Invariants
//! - Values are opaque JSON; (de)serialization of records is the caller's job.
//! - A `set` that returns `Ok` is visible to the next `get` in this process.
//! - A failure in one collection never mutates another collection.

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::db::DbError;

mod collection;
pub mod memory;
pub mod sqlite;

pub use collection::{Collection, CollectionLocks, Storage};
pub use memory::MemoryEngine;
pub use sqlite::SqliteEngine;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by collection store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Engine unreachable, disabled or out of quota. Nothing was written.
    StorageUnavailable { collection: String, message: String },
    /// A stored value could not be decoded as JSON.
    CorruptValue {
        collection: String,
        key: String,
        message: String,
    },
}

impl StoreError {
    pub fn unavailable(collection: &str, message: impl Display) -> Self {
        Self::StorageUnavailable {
            collection: collection.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn from_db(collection: &str, err: DbError) -> Self {
        Self::unavailable(collection, err)
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageUnavailable {
                collection,
                message,
            } => write!(f, "storage unavailable for collection `{collection}`: {message}"),
            Self::CorruptValue {
                collection,
                key,
                message,
            } => write!(
                f,
                "corrupt value at `{collection}/{key}`: {message}"
            ),
        }
    }
}

impl Error for StoreError {}

/// Async key/value access to one named collection.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Collection name this store is bound to.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> StoreResult<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Returns every stored pair ordered by key.
    async fn entries(&self) -> StoreResult<Vec<(String, Value)>>;

    /// Applies `visitor` to every stored key/value pair.
    async fn iterate(&self, visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v Value) + Send)) -> StoreResult<()> {
        for (key, value) in self.entries().await? {
            visitor(key.as_str(), &value);
        }
        Ok(())
    }
}

/// Factory for collection stores sharing one underlying engine.
pub trait StorageEngine: Send + Sync {
    fn open_collection(&self, name: &str) -> Arc<dyn CollectionStore>;
}
