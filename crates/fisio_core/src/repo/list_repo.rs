//! Generic repository for records stored as one list under one key.
//!
//! # Responsibility
//! - Implement `get_all/get_by_id/add/update/remove` for any [`Entity`].
//! - Run first-access seeding before every read and write.
//!
//! # Invariants
//! - The persisted list never holds two records with the same id.
//! - Records and patches failing [`Entity::validate`] are rejected before
//!   anything is written.
//! - `update` merges only the fields present in the patch and never changes
//!   `id`.
//! - Calls against the same collection are serialized through its token, so
//!   concurrent writers do not lose each other's changes.

use crate::model::entity::{new_record_id, Entity};
use crate::repo::{RepoError, RepoResult};
use crate::seed::ensure_seeded;
use crate::store::{Collection, Storage};
use chrono::Utc;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::time::Instant;

/// Result of a list rewrite: whether the list must be written back.
pub(crate) enum ListChange<T> {
    Unchanged(T),
    Changed(T),
}

/// CRUD façade over the record list of `E`.
pub struct ListRepository<E: Entity> {
    collection: Collection,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for ListRepository<E> {
    fn clone(&self) -> Self {
        Self::new(self.collection.clone())
    }
}

impl<E: Entity> ListRepository<E> {
    /// Binds the repository to an explicit collection handle.
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            _entity: PhantomData,
        }
    }

    /// Binds the repository to `E::COLLECTION` inside `storage`.
    pub fn from_storage(storage: &Storage) -> Self {
        Self::new(storage.collection(E::COLLECTION))
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Returns the full list, seeding the collection on first access.
    pub async fn get_all(&self) -> RepoResult<Vec<E>> {
        let _token = self.collection.lock().await;
        self.load().await
    }

    /// Linear scan by id. Returns `None` when absent.
    pub async fn get_by_id(&self, id: &str) -> RepoResult<Option<E>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|record| record.id() == id))
    }

    /// Returns every record matching `predicate`, in list order.
    pub async fn find_all<P>(&self, predicate: P) -> RepoResult<Vec<E>>
    where
        P: Fn(&E) -> bool + Send,
    {
        let records = self.get_all().await?;
        Ok(records.into_iter().filter(|record| predicate(record)).collect())
    }

    pub async fn count(&self) -> RepoResult<usize> {
        Ok(self.get_all().await?.len())
    }

    /// Creates a record from `draft` with a fresh id and timestamps.
    pub async fn add(&self, draft: E::Draft) -> RepoResult<E> {
        let record = E::from_draft(new_record_id(), Utc::now(), draft);
        validated::<E>(record.validate())?;
        self.rewrite("add", move |records| {
            records.push(record.clone());
            Ok(ListChange::Changed(record))
        })
        .await
    }

    /// Merges `patch` over the record with `id`.
    ///
    /// Returns `None` (and writes nothing) when no record has `id`.
    pub async fn update(&self, id: &str, patch: E::Patch) -> RepoResult<Option<E>> {
        validated::<E>(E::validate_patch(&patch))?;
        let overlay = serde_json::to_value(&patch).map_err(|err| {
            RepoError::InvalidData(format!(
                "patch for collection `{}` cannot be encoded: {err}",
                E::COLLECTION
            ))
        })?;

        self.rewrite("update", |records| {
            let Some(position) = position_of(records, id) else {
                return Ok(ListChange::Unchanged(None));
            };
            let mut updated = merge_patch(&records[position], &overlay)?;
            updated.touch(Utc::now());
            records[position] = updated.clone();
            Ok(ListChange::Changed(Some(updated)))
        })
        .await
    }

    /// Applies `apply` to the record with `id` in place, then refreshes its
    /// modification timestamp. Used for single-field toggles.
    pub async fn modify<F>(&self, id: &str, apply: F) -> RepoResult<Option<E>>
    where
        F: FnOnce(&mut E) + Send,
    {
        self.rewrite("modify", |records| {
            let Some(position) = position_of(records, id) else {
                return Ok(ListChange::Unchanged(None));
            };
            let record = &mut records[position];
            apply(record);
            validated::<E>(record.validate())?;
            record.touch(Utc::now());
            Ok(ListChange::Changed(Some(record.clone())))
        })
        .await
    }

    /// Removes the record with `id`. Returns `false` when nothing matched.
    pub async fn remove(&self, id: &str) -> RepoResult<bool> {
        self.rewrite("remove", |records| {
            let before = records.len();
            records.retain(|record| record.id() != id);
            if records.len() == before {
                Ok(ListChange::Unchanged(false))
            } else {
                Ok(ListChange::Changed(true))
            }
        })
        .await
    }

    /// Replaces the whole list. An empty list keeps the collection marked as
    /// populated, so defaults are not re-seeded.
    pub async fn replace_all(&self, records: Vec<E>) -> RepoResult<()> {
        ensure_unique_ids(&records)?;
        for record in &records {
            validated::<E>(record.validate())?;
        }
        let _token = self.collection.lock().await;
        let started_at = Instant::now();
        self.store_list(&records).await?;
        log_write::<E>("replace_all", started_at, records.len());
        Ok(())
    }

    /// Loads the list under the collection token, lets `apply` edit it and
    /// writes it back when the edit reports a change.
    pub(crate) async fn rewrite<T, F>(&self, op: &'static str, apply: F) -> RepoResult<T>
    where
        F: FnOnce(&mut Vec<E>) -> RepoResult<ListChange<T>> + Send,
        T: Send,
    {
        let _token = self.collection.lock().await;
        let started_at = Instant::now();
        let mut records = self.load().await?;

        match apply(&mut records)? {
            ListChange::Unchanged(value) => {
                debug!(
                    "event=repo_write module=repo status=skipped op={op} collection={} reason=not_found",
                    E::COLLECTION
                );
                Ok(value)
            }
            ListChange::Changed(value) => {
                self.store_list(&records).await?;
                log_write::<E>(op, started_at, records.len());
                Ok(value)
            }
        }
    }

    /// Seeds if needed, then reads the list. Caller holds the token.
    async fn load(&self) -> RepoResult<Vec<E>> {
        ensure_seeded::<E>(&self.collection).await?;
        match self.collection.get(E::LIST_KEY).await? {
            None => Ok(Vec::new()),
            Some(value) => decode_list::<E>(value),
        }
    }

    async fn store_list(&self, records: &[E]) -> RepoResult<()> {
        let value = serde_json::to_value(records).map_err(|err| {
            RepoError::InvalidData(format!(
                "list for collection `{}` cannot be encoded: {err}",
                E::COLLECTION
            ))
        })?;
        self.collection.set(E::LIST_KEY, &value).await?;
        Ok(())
    }
}

/// Decodes a persisted list value into records of `E`.
pub(crate) fn decode_list<E: Entity>(value: Value) -> RepoResult<Vec<E>> {
    serde_json::from_value(value).map_err(|err| {
        RepoError::InvalidData(format!(
            "list in collection `{}` does not match record shape: {err}",
            E::COLLECTION
        ))
    })
}

/// Rejects lists holding the same id twice.
pub(crate) fn ensure_unique_ids<E: Entity>(records: &[E]) -> RepoResult<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id()) {
            return Err(RepoError::DuplicateId(record.id().to_string()));
        }
    }
    Ok(())
}

fn validated<E: Entity>(check: Result<(), String>) -> RepoResult<()> {
    check.map_err(|message| {
        RepoError::InvalidData(format!("collection `{}`: {message}", E::COLLECTION))
    })
}

fn position_of<E: Entity>(records: &[E], id: &str) -> Option<usize> {
    records.iter().position(|record| record.id() == id)
}

fn merge_patch<E: Entity>(record: &E, overlay: &Value) -> RepoResult<E> {
    let mut base = serde_json::to_value(record).map_err(|err| {
        RepoError::InvalidData(format!(
            "record in collection `{}` cannot be encoded: {err}",
            E::COLLECTION
        ))
    })?;

    let not_object = || {
        RepoError::InvalidData(format!(
            "records and patches of collection `{}` must be JSON objects",
            E::COLLECTION
        ))
    };
    let Value::Object(changes) = overlay else {
        return Err(not_object());
    };
    let Value::Object(fields) = &mut base else {
        return Err(not_object());
    };
    for (field, value) in changes {
        if field == "id" {
            continue;
        }
        fields.insert(field.clone(), value.clone());
    }

    serde_json::from_value(base).map_err(|err| {
        RepoError::InvalidData(format!(
            "patched record in collection `{}` is invalid: {err}",
            E::COLLECTION
        ))
    })
}

fn log_write<E: Entity>(op: &str, started_at: Instant, records: usize) {
    info!(
        "event=repo_write module=repo status=ok op={op} collection={} records={} duration_ms={}",
        E::COLLECTION,
        records,
        started_at.elapsed().as_millis()
    );
}
