//! Process-local collection store.
//!
//! Used for ephemeral stores and tests. Supports simple fault injection so
//! callers can exercise `StorageUnavailable` paths, and counts successful
//! writes per collection for inspection.

use super::{CollectionStore, StorageEngine, StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Value>>,
    writes: HashMap<String, usize>,
    unavailable: bool,
    rejected_writes: HashSet<String>,
}

/// In-memory storage engine. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation on every collection fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Makes `set` fail for one collection (reads keep working).
    pub fn reject_writes_for(&self, collection: &str) {
        self.state().rejected_writes.insert(collection.to_string());
    }

    pub fn accept_all_writes(&self) {
        self.state().rejected_writes.clear();
    }

    /// Number of successful `set` calls against `collection`.
    pub fn write_count(&self, collection: &str) -> usize {
        self.state().writes.get(collection).copied().unwrap_or(0)
    }

    /// Raw value stored under `collection/key`, bypassing fault injection.
    pub fn raw_value(&self, collection: &str, key: &str) -> Option<Value> {
        self.state()
            .collections
            .get(collection)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// Raw keys stored in `collection`, bypassing fault injection.
    pub fn raw_keys(&self, collection: &str) -> Vec<String> {
        self.state()
            .collections
            .get(collection)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageEngine for MemoryEngine {
    fn open_collection(&self, name: &str) -> Arc<dyn CollectionStore> {
        Arc::new(MemoryCollectionStore {
            engine: self.clone(),
            collection: name.to_string(),
        })
    }
}

/// One collection inside [`MemoryEngine`].
pub struct MemoryCollectionStore {
    engine: MemoryEngine,
    collection: String,
}

impl MemoryCollectionStore {
    fn check_available(&self, state: &MemoryState) -> StoreResult<()> {
        if state.unavailable {
            return Err(StoreError::unavailable(
                &self.collection,
                "storage disabled",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionStore for MemoryCollectionStore {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let state = self.engine.state();
        self.check_available(&state)?;
        Ok(state
            .collections
            .get(&self.collection)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut state = self.engine.state();
        self.check_available(&state)?;
        if state.rejected_writes.contains(&self.collection) {
            return Err(StoreError::unavailable(&self.collection, "quota exceeded"));
        }
        state
            .collections
            .entry(self.collection.clone())
            .or_default()
            .insert(key.to_string(), value.clone());
        *state.writes.entry(self.collection.clone()).or_default() += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let mut state = self.engine.state();
        self.check_available(&state)?;
        if let Some(entries) = state.collections.get_mut(&self.collection) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<(String, Value)>> {
        let state = self.engine.state();
        self.check_available(&state)?;
        Ok(state
            .collections
            .get(&self.collection)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
