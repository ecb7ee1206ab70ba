//! Shared async access to one SQLite connection.
//!
//! # Responsibility
//! - Own the bootstrapped connection behind a mutex.
//! - Run blocking rusqlite work on the tokio blocking pool.
//!
//! # Invariants
//! - Only one closure touches the connection at a time.
//! - A lost blocking task surfaces as [`DbError::Unavailable`], never as a
//!   panic.
//! - A lock poisoned by a panicking closure is recovered and any transaction
//!   the closure left open is rolled back.

use super::{open_db, open_db_in_memory, DbError, DbResult};
use log::warn;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable handle to the core SQLite connection.
#[derive(Clone)]
pub struct DbHandle {
    conn: Arc<Mutex<Connection>>,
}

impl DbHandle {
    /// Wraps an already bootstrapped connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        open_db(path).map(Self::new)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        open_db_in_memory().map(Self::new)
    }

    /// Runs `op` against the connection on the blocking pool.
    ///
    /// # Errors
    /// - Returns whatever `op` returns.
    /// - Returns `DbError::Unavailable` (converted into `E`) when the
    ///   blocking task cannot complete.
    pub async fn call<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| {
                let guard = PoisonError::into_inner(poisoned);
                if !guard.is_autocommit() && guard.execute_batch("ROLLBACK;").is_err() {
                    warn!("event=db_recover module=db status=error reason=rollback_failed");
                }
                guard
            });
            op(&mut guard)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(err) => Err(E::from(DbError::Unavailable(format!(
                "blocking task failed: {err}"
            )))),
        }
    }
}
