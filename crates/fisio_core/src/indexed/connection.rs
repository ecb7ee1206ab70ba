//! Record access on an opened indexed database.
//!
//! # Invariants
//! - Every operation names an object store that exists in the catalog.
//! - Primary keys are integers stored both as the row key and inside the
//!   record at the store's key path.
//! - Index lookups evaluate the index key path against stored JSON, so
//!   records written before an index was declared are found through it.

use super::manager::OpenReport;
use super::schema::{ensure_identifier, key_path_expression, DatabaseSchema};
use super::{IndexedError, IndexedResult};
use crate::db::DbHandle;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};

/// Largest primary key a store accepts or generates (2^53).
pub const MAX_KEY: i64 = 9_007_199_254_740_992;

struct StoreMeta {
    key_path: String,
    auto_increment: bool,
    next_key: i64,
}

/// Open connection to one indexed database at one version.
#[derive(Clone)]
pub struct IndexedConnection {
    db: DbHandle,
    schema: &'static DatabaseSchema,
    report: OpenReport,
}

impl Debug for IndexedConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedConnection")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

impl IndexedConnection {
    pub(crate) fn new(db: DbHandle, schema: &'static DatabaseSchema, report: OpenReport) -> Self {
        Self { db, schema, report }
    }

    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    pub fn version(&self) -> u32 {
        self.report.version
    }

    pub fn report(&self) -> &OpenReport {
        &self.report
    }

    pub async fn object_store_names(&self) -> IndexedResult<Vec<String>> {
        let name = self.name();
        self.db
            .call(move |conn| -> IndexedResult<Vec<String>> {
                let mut stmt = conn.prepare(
                    "SELECT store_name FROM indexed_object_stores
                     WHERE db_name = ?1
                     ORDER BY store_name ASC;",
                )?;
                let mut rows = stmt.query([name])?;
                let mut names = Vec::new();
                while let Some(row) = rows.next()? {
                    names.push(row.get(0)?);
                }
                Ok(names)
            })
            .await
    }

    pub async fn index_names(&self, store: &str) -> IndexedResult<Vec<String>> {
        let name = self.name();
        let store = store.to_string();
        self.db
            .call(move |conn| -> IndexedResult<Vec<String>> {
                store_meta(conn, name, &store)?;
                let mut stmt = conn.prepare(
                    "SELECT index_name FROM indexed_indexes
                     WHERE db_name = ?1 AND store_name = ?2
                     ORDER BY index_name ASC;",
                )?;
                let mut rows = stmt.query(params![name, store])?;
                let mut names = Vec::new();
                while let Some(row) = rows.next()? {
                    names.push(row.get(0)?);
                }
                Ok(names)
            })
            .await
    }

    /// Inserts a new record and returns its primary key.
    ///
    /// The key comes from the record's key-path field when present,
    /// otherwise from the store's key generator.
    pub async fn add(&self, store: &str, value: Value) -> IndexedResult<i64> {
        self.write(store, value, false).await
    }

    /// Inserts or replaces a record and returns its primary key.
    pub async fn put(&self, store: &str, value: Value) -> IndexedResult<i64> {
        self.write(store, value, true).await
    }

    pub async fn get(&self, store: &str, key: i64) -> IndexedResult<Option<Value>> {
        let name = self.name();
        let store = store.to_string();
        self.db
            .call(move |conn| -> IndexedResult<Option<Value>> {
                store_meta(conn, name, &store)?;
                let raw = conn
                    .query_row(
                        "SELECT value_json FROM indexed_records
                         WHERE db_name = ?1 AND store_name = ?2 AND primary_key = ?3;",
                        params![name, store, key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                raw.map(|raw| decode(&raw)).transpose()
            })
            .await
    }

    /// Every record of `store`, ordered by primary key.
    pub async fn get_all(&self, store: &str) -> IndexedResult<Vec<Value>> {
        let name = self.name();
        let store = store.to_string();
        self.db
            .call(move |conn| -> IndexedResult<Vec<Value>> {
                store_meta(conn, name, &store)?;
                query_values(
                    conn,
                    "SELECT value_json FROM indexed_records
                     WHERE db_name = ?1 AND store_name = ?2
                     ORDER BY primary_key ASC;",
                    vec![SqlValue::from(name.to_string()), SqlValue::from(store)],
                )
            })
            .await
    }

    /// Records whose `index` key equals `key`, ordered by primary key.
    pub async fn get_all_by_index(
        &self,
        store: &str,
        index: &str,
        key: &Value,
    ) -> IndexedResult<Vec<Value>> {
        let name = self.name();
        let store = store.to_string();
        let index = index.to_string();
        let key = scalar_key(key)?;
        self.db
            .call(move |conn| -> IndexedResult<Vec<Value>> {
                store_meta(conn, name, &store)?;
                let key_path = index_key_path(conn, name, &store, &index)?;
                query_values(
                    conn,
                    &format!(
                        "SELECT value_json FROM indexed_records
                         WHERE db_name = ?1 AND store_name = ?2 AND {} = ?3
                         ORDER BY primary_key ASC;",
                        key_path_expression(&key_path)
                    ),
                    vec![SqlValue::from(name.to_string()), SqlValue::from(store), key],
                )
            })
            .await
    }

    pub async fn count(&self, store: &str) -> IndexedResult<u64> {
        let name = self.name();
        let store = store.to_string();
        self.db
            .call(move |conn| -> IndexedResult<u64> {
                store_meta(conn, name, &store)?;
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM indexed_records WHERE db_name = ?1 AND store_name = ?2;",
                    params![name, store],
                    |row| row.get(0),
                )?;
                Ok(count.max(0) as u64)
            })
            .await
    }

    /// Deletes one record. Returns `false` when the key was absent.
    pub async fn delete(&self, store: &str, key: i64) -> IndexedResult<bool> {
        let name = self.name();
        let store = store.to_string();
        self.db
            .call(move |conn| -> IndexedResult<bool> {
                store_meta(conn, name, &store)?;
                let changed = conn.execute(
                    "DELETE FROM indexed_records
                     WHERE db_name = ?1 AND store_name = ?2 AND primary_key = ?3;",
                    params![name, store, key],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    /// Deletes every record of `store`; the store and its indexes remain.
    pub async fn clear(&self, store: &str) -> IndexedResult<u64> {
        let name = self.name();
        let store = store.to_string();
        self.db
            .call(move |conn| -> IndexedResult<u64> {
                store_meta(conn, name, &store)?;
                let changed = conn.execute(
                    "DELETE FROM indexed_records WHERE db_name = ?1 AND store_name = ?2;",
                    params![name, store],
                )?;
                Ok(changed as u64)
            })
            .await
    }

    async fn write(&self, store: &str, value: Value, overwrite: bool) -> IndexedResult<i64> {
        let name = self.name();
        let store = store.to_string();
        let Value::Object(record) = value else {
            return Err(IndexedError::InvalidData(format!(
                "records in `{store}` must be JSON objects"
            )));
        };
        self.db
            .call(move |conn| write_record(conn, name, &store, record, overwrite))
            .await
    }
}

fn write_record(
    conn: &mut Connection,
    name: &str,
    store: &str,
    mut record: Map<String, Value>,
    overwrite: bool,
) -> IndexedResult<i64> {
    let tx = conn.transaction()?;
    let meta = store_meta(&tx, name, store)?;

    let key = match record.get(&meta.key_path) {
        Some(Value::Number(number)) => number.as_i64().ok_or_else(|| {
            IndexedError::InvalidData(format!("key `{number}` in `{store}` is not an integer"))
        })?,
        Some(Value::Null) | None if meta.auto_increment => {
            if meta.next_key > MAX_KEY {
                return Err(IndexedError::ConstraintViolation {
                    store: store.to_string(),
                    detail: "key generator is exhausted".to_string(),
                });
            }
            meta.next_key
        }
        Some(other) => {
            return Err(IndexedError::InvalidData(format!(
                "key `{other}` in `{store}` is not an integer"
            )))
        }
        None => {
            return Err(IndexedError::InvalidData(format!(
                "record in `{store}` has no `{}` key and the store has no key generator",
                meta.key_path
            )))
        }
    };
    if !(-MAX_KEY..=MAX_KEY).contains(&key) {
        return Err(IndexedError::InvalidData(format!(
            "key {key} in `{store}` is outside -{MAX_KEY}..={MAX_KEY}"
        )));
    }
    record.insert(meta.key_path.clone(), Value::from(key));
    let raw = serde_json::to_string(&record)
        .map_err(|err| IndexedError::InvalidData(err.to_string()))?;

    if !overwrite && record_exists(&tx, name, store, key)? {
        return Err(IndexedError::ConstraintViolation {
            store: store.to_string(),
            detail: format!("key {key} already exists"),
        });
    }
    check_unique_indexes(&tx, name, store, key, &raw)?;

    tx.execute(
        "INSERT INTO indexed_records (db_name, store_name, primary_key, value_json)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (db_name, store_name, primary_key) DO UPDATE SET
            value_json = excluded.value_json;",
        params![name, store, key, raw],
    )?;
    if key >= meta.next_key {
        let next_key = key.checked_add(1).ok_or_else(|| {
            IndexedError::InvalidData(format!("key {key} in `{store}` cannot advance the generator"))
        })?;
        tx.execute(
            "UPDATE indexed_object_stores SET next_key = ?3
             WHERE db_name = ?1 AND store_name = ?2;",
            params![name, store, next_key],
        )?;
    }
    tx.commit()?;
    Ok(key)
}

fn store_meta(conn: &Connection, name: &str, store: &str) -> IndexedResult<StoreMeta> {
    ensure_identifier(store)?;
    conn.query_row(
        "SELECT key_path, auto_increment, next_key FROM indexed_object_stores
         WHERE db_name = ?1 AND store_name = ?2;",
        params![name, store],
        |row| {
            Ok(StoreMeta {
                key_path: row.get(0)?,
                auto_increment: row.get(1)?,
                next_key: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| IndexedError::UnknownObjectStore(store.to_string()))
}

fn index_key_path(conn: &Connection, name: &str, store: &str, index: &str) -> IndexedResult<String> {
    ensure_identifier(index)?;
    let key_path: Option<String> = conn
        .query_row(
            "SELECT key_path FROM indexed_indexes
             WHERE db_name = ?1 AND store_name = ?2 AND index_name = ?3;",
            params![name, store, index],
            |row| row.get(0),
        )
        .optional()?;
    let key_path = key_path.ok_or_else(|| IndexedError::UnknownIndex {
        store: store.to_string(),
        index: index.to_string(),
    })?;
    ensure_identifier(&key_path)?;
    Ok(key_path)
}

fn record_exists(conn: &Connection, name: &str, store: &str, key: i64) -> IndexedResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM indexed_records
            WHERE db_name = ?1 AND store_name = ?2 AND primary_key = ?3
        );",
        params![name, store, key],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn check_unique_indexes(
    conn: &Connection,
    name: &str,
    store: &str,
    key: i64,
    raw: &str,
) -> IndexedResult<()> {
    let mut stmt = conn.prepare(
        "SELECT index_name, key_path FROM indexed_indexes
         WHERE db_name = ?1 AND store_name = ?2 AND is_unique = 1;",
    )?;
    let mut rows = stmt.query(params![name, store])?;
    let mut unique = Vec::new();
    while let Some(row) = rows.next()? {
        unique.push((row.get::<_, String>(0)?, row.get::<_, String>(1)?));
    }

    for (index, key_path) in unique {
        ensure_identifier(&key_path)?;
        let expression = key_path_expression(&key_path);
        let clash: i64 = conn.query_row(
            &format!(
                "SELECT EXISTS(
                    SELECT 1 FROM indexed_records
                    WHERE db_name = ?1 AND store_name = ?2 AND primary_key != ?3
                      AND {expression} = json_extract(?4, '$.{key_path}')
                );"
            ),
            params![name, store, key, raw],
            |row| row.get(0),
        )?;
        if clash == 1 {
            return Err(IndexedError::ConstraintViolation {
                store: store.to_string(),
                detail: format!("unique index `{index}` already holds this key"),
            });
        }
    }
    Ok(())
}

fn query_values(conn: &Connection, sql: &str, bind: Vec<SqlValue>) -> IndexedResult<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(bind))?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        let raw: String = row.get(0)?;
        values.push(decode(&raw)?);
    }
    Ok(values)
}

fn decode(raw: &str) -> IndexedResult<Value> {
    serde_json::from_str(raw).map_err(|err| IndexedError::InvalidData(err.to_string()))
}

/// Converts a JSON index key into the SQL value `json_extract` yields.
fn scalar_key(key: &Value) -> IndexedResult<SqlValue> {
    match key {
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Ok(SqlValue::Integer(integer))
            } else if let Some(real) = number.as_f64() {
                Ok(SqlValue::Real(real))
            } else {
                Err(IndexedError::InvalidData(format!(
                    "index key `{number}` is out of range"
                )))
            }
        }
        other => Err(IndexedError::InvalidData(format!(
            "index keys must be strings, numbers or booleans, got `{other}`"
        ))),
    }
}
