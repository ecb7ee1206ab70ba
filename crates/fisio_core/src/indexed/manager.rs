//! Open/upgrade lifecycle of one indexed database.
//!
//! # Responsibility
//! - Drive `Unopened -> Opening -> (Upgrading)? -> Open`.
//! - Run pending migrations in one transaction and verify the result.
//!
//! # Invariants
//! - `Upgrading` is entered only when the requested version exceeds the
//!   persisted one.
//! - The persisted version is bumped in the same transaction that created
//!   the pieces, after verification.
//! - Any failure returns the state to `Unopened`.

use super::connection::IndexedConnection;
use super::schema::{apply_step, persisted_layout, DatabaseSchema};
use super::{IndexedError, IndexedResult};
use crate::db::DbHandle;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Opening,
    Upgrading,
    Open,
}

/// What happened while opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReport {
    pub previous_version: u32,
    pub version: u32,
    /// Names of migrations applied by this open, in order.
    pub applied_migrations: Vec<&'static str>,
}

impl OpenReport {
    pub fn upgraded(&self) -> bool {
        self.version > self.previous_version
    }
}

struct StateLog {
    current: ConnectionState,
    history: Vec<ConnectionState>,
}

/// Opens one declared database at requested versions.
pub struct SchemaVersionManager {
    db: DbHandle,
    schema: &'static DatabaseSchema,
    state: Mutex<StateLog>,
    open_serial: AsyncMutex<()>,
}

impl SchemaVersionManager {
    pub fn new(db: DbHandle, schema: &'static DatabaseSchema) -> Self {
        Self {
            db,
            schema,
            state: Mutex::new(StateLog {
                current: ConnectionState::Unopened,
                history: vec![ConnectionState::Unopened],
            }),
            open_serial: AsyncMutex::new(()),
        }
    }

    pub fn schema(&self) -> &'static DatabaseSchema {
        self.schema
    }

    pub fn state(&self) -> ConnectionState {
        self.state_log().current
    }

    /// Every state entered since construction, oldest first.
    pub fn state_history(&self) -> Vec<ConnectionState> {
        self.state_log().history.clone()
    }

    /// Version currently persisted for this database (0 when never opened).
    pub async fn persisted_version(&self) -> IndexedResult<u32> {
        let name = self.schema.name;
        self.db.call(move |conn| read_version(conn, name)).await
    }

    /// Opens the database at `version`, upgrading when it is ahead of the
    /// persisted version.
    ///
    /// # Errors
    /// - `UnsupportedVersion` for 0 or a version beyond the last migration.
    /// - `VersionDowngrade` when `version` is below the persisted version.
    /// - `SchemaOpenFailed` when the engine fails or the persisted layout is
    ///   missing expected pieces.
    /// - `UpgradeIncomplete` / `UnknownObjectStore` when an upgrade cannot
    ///   produce the expected layout; nothing from that upgrade is kept.
    pub async fn open(&self, version: u32) -> IndexedResult<IndexedConnection> {
        let _serial = self.open_serial.lock().await;
        let schema = self.schema;
        let name = schema.name;
        schema.validate()?;

        let latest = schema.latest_version();
        if version == 0 || version > latest {
            return Err(IndexedError::UnsupportedVersion {
                name: name.to_string(),
                requested: version,
                latest,
            });
        }

        let started_at = Instant::now();
        self.transition(ConnectionState::Opening);
        info!("event=indexed_open module=indexed status=start db={name} version={version}");

        match self.open_inner(version).await {
            Ok(report) => {
                self.transition(ConnectionState::Open);
                info!(
                    "event=indexed_open module=indexed status=ok db={name} from_version={} version={} applied={} duration_ms={}",
                    report.previous_version,
                    report.version,
                    report.applied_migrations.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(IndexedConnection::new(self.db.clone(), schema, report))
            }
            Err(err) => {
                self.transition(ConnectionState::Unopened);
                let err = into_open_failure(name, err);
                error!(
                    "event=indexed_open module=indexed status=error db={name} version={version} duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    async fn open_inner(&self, version: u32) -> IndexedResult<OpenReport> {
        let schema = self.schema;
        let persisted = self.persisted_version().await?;

        if version < persisted {
            return Err(IndexedError::VersionDowngrade {
                name: schema.name.to_string(),
                requested: version,
                persisted,
            });
        }

        if version == persisted {
            self.db
                .call(move |conn| verify_layout(conn, schema, version))
                .await
                .map_err(|err| match err {
                    IndexedError::UpgradeIncomplete { name, missing, .. } => {
                        IndexedError::SchemaOpenFailed {
                            name,
                            message: format!("missing {}", missing.join(", ")),
                        }
                    }
                    other => other,
                })?;
            return Ok(OpenReport {
                previous_version: persisted,
                version,
                applied_migrations: Vec::new(),
            });
        }

        self.transition(ConnectionState::Upgrading);
        let started_at = Instant::now();
        let applied = self
            .db
            .call(move |conn| upgrade(conn, schema, persisted, version))
            .await?;
        info!(
            "event=schema_upgrade module=indexed status=ok db={} from_version={persisted} to_version={version} migrations={} duration_ms={}",
            schema.name,
            applied.join(","),
            started_at.elapsed().as_millis()
        );

        Ok(OpenReport {
            previous_version: persisted,
            version,
            applied_migrations: applied,
        })
    }

    fn transition(&self, next: ConnectionState) {
        let mut log = self.state_log();
        log.current = next;
        log.history.push(next);
    }

    fn state_log(&self) -> MutexGuard<'_, StateLog> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_version(conn: &mut Connection, name: &str) -> IndexedResult<u32> {
    let version = conn
        .query_row(
            "SELECT version FROM indexed_databases WHERE db_name = ?1;",
            [name],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0))
}

fn verify_layout(conn: &Connection, schema: &DatabaseSchema, version: u32) -> IndexedResult<()> {
    let missing = schema
        .expected_layout(version)
        .missing_from(&persisted_layout(conn, schema.name)?);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(IndexedError::UpgradeIncomplete {
            name: schema.name.to_string(),
            version,
            missing,
        })
    }
}

fn upgrade(
    conn: &mut Connection,
    schema: &'static DatabaseSchema,
    from: u32,
    to: u32,
) -> IndexedResult<Vec<&'static str>> {
    let tx = conn.transaction()?;
    let mut applied = Vec::new();

    for migration in schema.pending(from, to) {
        let mut created = 0;
        for step in migration.steps {
            if apply_step(&tx, schema.name, step)? {
                created += 1;
            }
        }
        info!(
            "event=schema_migration module=indexed status=ok db={} version={} name={} created={created}",
            schema.name, migration.version, migration.name
        );
        applied.push(migration.name);
    }

    // Dropping `tx` on error rolls every step of this upgrade back.
    verify_layout(&tx, schema, to)?;

    tx.execute(
        "INSERT INTO indexed_databases (db_name, version) VALUES (?1, ?2)
         ON CONFLICT (db_name) DO UPDATE SET version = excluded.version;",
        params![schema.name, to],
    )?;
    tx.commit()?;
    Ok(applied)
}

fn into_open_failure(name: &str, err: IndexedError) -> IndexedError {
    match err {
        IndexedError::Db(err) => IndexedError::SchemaOpenFailed {
            name: name.to_string(),
            message: err.to_string(),
        },
        other => other,
    }
}
