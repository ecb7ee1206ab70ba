//! SQLite-backed collection store.
//!
//! # Responsibility
//! - Persist collection entries in the `collection_entries` table.
//! - Keep every SQL detail for collections inside this module.
//!
//! # Invariants
//! - One row per `(collection, entry_key)`; `set` is an upsert.
//! - `value_json` always holds serialized JSON written by this module.

use super::{CollectionStore, StorageEngine, StoreError, StoreResult};
use crate::db::{DbError, DbHandle, DbResult};
use async_trait::async_trait;
use log::{debug, error};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Storage engine writing every collection into one SQLite database.
#[derive(Clone)]
pub struct SqliteEngine {
    db: DbHandle,
}

impl SqliteEngine {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        DbHandle::open(path).map(Self::new)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        DbHandle::open_in_memory().map(Self::new)
    }

    /// Connection handle shared with other SQLite consumers.
    pub fn handle(&self) -> DbHandle {
        self.db.clone()
    }
}

impl StorageEngine for SqliteEngine {
    fn open_collection(&self, name: &str) -> Arc<dyn CollectionStore> {
        Arc::new(SqliteCollectionStore {
            db: self.db.clone(),
            collection: name.to_string(),
        })
    }
}

/// One collection inside [`SqliteEngine`].
pub struct SqliteCollectionStore {
    db: DbHandle,
    collection: String,
}

impl SqliteCollectionStore {
    fn decode(&self, key: &str, raw: &str) -> StoreResult<Value> {
        serde_json::from_str(raw).map_err(|err| StoreError::CorruptValue {
            collection: self.collection.clone(),
            key: key.to_string(),
            message: err.to_string(),
        })
    }

    fn surface(&self, op: &'static str, err: DbError) -> StoreError {
        error!(
            "event=store_op module=store status=error op={op} collection={} error={}",
            self.collection, err
        );
        StoreError::from_db(&self.collection, err)
    }
}

#[async_trait]
impl CollectionStore for SqliteCollectionStore {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let collection = self.collection.clone();
        let entry_key = key.to_string();
        let raw = self
            .db
            .call(move |conn| -> DbResult<Option<String>> {
                let raw = conn
                    .query_row(
                        "SELECT value_json
                         FROM collection_entries
                         WHERE collection = ?1 AND entry_key = ?2;",
                        params![collection, entry_key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(raw)
            })
            .await
            .map_err(|err| self.surface("get", err))?;

        raw.map(|raw| self.decode(key, &raw)).transpose()
    }

    async fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|err| StoreError::unavailable(&self.collection, err))?;
        let collection = self.collection.clone();
        let entry_key = key.to_string();
        self.db
            .call(move |conn| -> DbResult<()> {
                conn.execute(
                    "INSERT INTO collection_entries (collection, entry_key, value_json)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (collection, entry_key) DO UPDATE SET
                        value_json = excluded.value_json,
                        updated_at = (strftime('%s', 'now') * 1000);",
                    params![collection, entry_key, raw],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| self.surface("set", err))?;

        debug!(
            "event=store_op module=store status=ok op=set collection={}",
            self.collection
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let collection = self.collection.clone();
        let entry_key = key.to_string();
        self.db
            .call(move |conn| -> DbResult<()> {
                conn.execute(
                    "DELETE FROM collection_entries
                     WHERE collection = ?1 AND entry_key = ?2;",
                    params![collection, entry_key],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| self.surface("remove", err))
    }

    async fn entries(&self) -> StoreResult<Vec<(String, Value)>> {
        let collection = self.collection.clone();
        let rows = self
            .db
            .call(move |conn| -> DbResult<Vec<(String, String)>> {
                let mut stmt = conn.prepare(
                    "SELECT entry_key, value_json
                     FROM collection_entries
                     WHERE collection = ?1
                     ORDER BY entry_key ASC;",
                )?;
                let mut rows = stmt.query([collection.as_str()])?;
                let mut entries = Vec::new();
                while let Some(row) = rows.next()? {
                    entries.push((row.get(0)?, row.get(1)?));
                }
                Ok(entries)
            })
            .await
            .map_err(|err| self.surface("entries", err))?;

        rows.into_iter()
            .map(|(key, raw)| {
                let value = self.decode(&key, &raw)?;
                Ok((key, value))
            })
            .collect()
    }
}
