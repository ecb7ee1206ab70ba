//! Explicitly constructed storage handle and per-collection tokens.

use super::{CollectionStore, StorageEngine, StoreResult};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of mutual-exclusion tokens keyed by collection name.
///
/// Waiters are served in FIFO order, so the token doubles as the queue of
/// pending operations for its collection.
#[derive(Default)]
pub struct CollectionLocks {
    tokens: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for `name`, creating it on first use.
    pub fn token(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            tokens
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

/// Storage handle injected into repositories.
///
/// Owned by the application entry point. Every clone shares the engine and
/// the token registry.
#[derive(Clone)]
pub struct Storage {
    engine: Arc<dyn StorageEngine>,
    locks: Arc<CollectionLocks>,
}

impl Storage {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            locks: Arc::new(CollectionLocks::new()),
        }
    }

    /// Returns a handle bound to the named collection.
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            store: self.engine.open_collection(name),
            token: self.locks.token(name),
        }
    }
}

/// One named collection plus its mutual-exclusion token.
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn CollectionStore>,
    token: Arc<AsyncMutex<()>>,
}

impl Collection {
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// Waits for exclusive access to this collection.
    ///
    /// Not reentrant: code holding the guard must not call `lock` again on
    /// the same collection.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.token).lock_owned().await
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.store.get(key).await
    }

    pub async fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.store.set(key, value).await
    }

    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        self.store.remove(key).await
    }

    pub async fn entries(&self) -> StoreResult<Vec<(String, Value)>> {
        self.store.entries().await
    }

    pub async fn iterate(
        &self,
        visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v Value) + Send),
    ) -> StoreResult<()> {
        self.store.iterate(visitor).await
    }
}

impl Debug for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name())
            .finish()
    }
}
