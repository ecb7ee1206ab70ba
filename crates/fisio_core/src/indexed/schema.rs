//! Declarative layout of indexed databases.
//!
//! # Responsibility
//! - Describe each schema version as a named list of additive steps.
//! - Compute the layout expected at any version.
//! - Apply single steps idempotently and read back the persisted layout.
//!
//! # Invariants
//! - Migration versions start at 1 and strictly increase.
//! - Store, index and key-path names are plain identifiers; they are
//!   interpolated into SQL only after validation.

use super::{IndexedError, IndexedResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// One additive, idempotent schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStep {
    /// Creates an object store unless it already exists.
    CreateObjectStore {
        store: &'static str,
        key_path: &'static str,
        auto_increment: bool,
    },
    /// Creates a secondary index unless it already exists.
    CreateIndex {
        store: &'static str,
        index: &'static str,
        key_path: &'static str,
        unique: bool,
    },
}

/// Named group of steps that brings the database to `version`.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub steps: &'static [SchemaStep],
}

/// Full versioned definition of one indexed database.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseSchema {
    pub name: &'static str,
    pub migrations: &'static [Migration],
}

/// Set of stores and `(store, index)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaLayout {
    pub stores: BTreeSet<String>,
    pub indexes: BTreeSet<(String, String)>,
}

impl SchemaLayout {
    /// Describes every piece of `self` absent from `actual`.
    pub fn missing_from(&self, actual: &SchemaLayout) -> Vec<String> {
        let stores = self
            .stores
            .difference(&actual.stores)
            .map(|store| format!("store {store}"));
        let indexes = self
            .indexes
            .difference(&actual.indexes)
            .map(|(store, index)| format!("index {store}.{index}"));
        stores.chain(indexes).collect()
    }
}

impl DatabaseSchema {
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |migration| migration.version)
    }

    /// Checks version ordering and every identifier.
    pub fn validate(&self) -> IndexedResult<()> {
        ensure_identifier(self.name)?;
        let mut previous = 0;
        for migration in self.migrations {
            if migration.version <= previous {
                return Err(IndexedError::InvalidSchema(format!(
                    "migration `{}` has version {} after version {previous}",
                    migration.name, migration.version
                )));
            }
            previous = migration.version;

            for step in migration.steps {
                match *step {
                    SchemaStep::CreateObjectStore { store, key_path, .. } => {
                        ensure_identifier(store)?;
                        ensure_identifier(key_path)?;
                    }
                    SchemaStep::CreateIndex {
                        store,
                        index,
                        key_path,
                        ..
                    } => {
                        ensure_identifier(store)?;
                        ensure_identifier(index)?;
                        ensure_identifier(key_path)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Migrations with `from < version <= to`, in order.
    pub fn pending(&self, from: u32, to: u32) -> impl Iterator<Item = &Migration> + '_ {
        self.migrations
            .iter()
            .filter(move |migration| migration.version > from && migration.version <= to)
    }

    /// Layout produced by every migration up to and including `version`.
    pub fn expected_layout(&self, version: u32) -> SchemaLayout {
        let mut layout = SchemaLayout::default();
        for migration in self.pending(0, version) {
            for step in migration.steps {
                match *step {
                    SchemaStep::CreateObjectStore { store, .. } => {
                        layout.stores.insert(store.to_string());
                    }
                    SchemaStep::CreateIndex { store, index, .. } => {
                        layout.indexes.insert((store.to_string(), index.to_string()));
                    }
                }
            }
        }
        layout
    }
}

pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

pub(crate) fn ensure_identifier(value: &str) -> IndexedResult<()> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(IndexedError::InvalidIdentifier(value.to_string()))
    }
}

/// SQL expression extracting `key_path` from a stored record.
pub(crate) fn key_path_expression(key_path: &str) -> String {
    format!("json_extract(value_json, '$.{key_path}')")
}

fn physical_index_name(db_name: &str, store: &str, index: &str) -> String {
    format!("idx_{db_name}_{store}_{index}")
}

/// Applies one step. Returns `true` when something was created.
pub(crate) fn apply_step(conn: &Connection, db_name: &str, step: &SchemaStep) -> IndexedResult<bool> {
    match *step {
        SchemaStep::CreateObjectStore {
            store,
            key_path,
            auto_increment,
        } => {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO indexed_object_stores
                    (db_name, store_name, key_path, auto_increment)
                 VALUES (?1, ?2, ?3, ?4);",
                params![db_name, store, key_path, auto_increment],
            )?;
            Ok(inserted == 1)
        }
        SchemaStep::CreateIndex {
            store,
            index,
            key_path,
            unique,
        } => {
            if !store_exists(conn, db_name, store)? {
                return Err(IndexedError::UnknownObjectStore(store.to_string()));
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO indexed_indexes
                    (db_name, store_name, index_name, key_path, is_unique)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![db_name, store, index, key_path, unique],
            )?;
            conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS \"{}\"
                 ON indexed_records (db_name, store_name, {});",
                physical_index_name(db_name, store, index),
                key_path_expression(key_path)
            ))?;
            Ok(inserted == 1)
        }
    }
}

/// Reads the layout currently persisted for `db_name`.
///
/// An index counts as present only when both its catalog row and its SQLite
/// index exist.
pub(crate) fn persisted_layout(conn: &Connection, db_name: &str) -> IndexedResult<SchemaLayout> {
    let mut layout = SchemaLayout::default();

    let mut stmt = conn.prepare(
        "SELECT store_name FROM indexed_object_stores WHERE db_name = ?1;",
    )?;
    let mut rows = stmt.query([db_name])?;
    while let Some(row) = rows.next()? {
        layout.stores.insert(row.get(0)?);
    }

    let mut stmt = conn.prepare(
        "SELECT store_name, index_name FROM indexed_indexes WHERE db_name = ?1;",
    )?;
    let mut rows = stmt.query([db_name])?;
    while let Some(row) = rows.next()? {
        let store: String = row.get(0)?;
        let index: String = row.get(1)?;
        if sqlite_index_exists(conn, &physical_index_name(db_name, &store, &index))? {
            layout.indexes.insert((store, index));
        }
    }

    Ok(layout)
}

pub(crate) fn store_exists(conn: &Connection, db_name: &str, store: &str) -> IndexedResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM indexed_object_stores
            WHERE db_name = ?1 AND store_name = ?2
        );",
        params![db_name, store],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn sqlite_index_exists(conn: &Connection, name: &str) -> IndexedResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1
        );",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
