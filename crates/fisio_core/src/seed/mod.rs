//! First-run initialization of list collections.
//!
//! # Responsibility
//! - Write an entity's default record set into a never-populated collection.
//! - Leave any present list alone, including an empty one.
//!
//! # Invariants
//! - Presence of the canonical list key is the only "already seeded" marker,
//!   for every entity type.
//! - Callers hold the collection token while seeding, so the presence check
//!   and the write cannot interleave with other repository calls.

use crate::model::entity::Entity;
use crate::repo::{RepoError, RepoResult};
use crate::store::{Collection, Storage};
use log::info;
use std::time::Instant;

pub mod data;

/// What [`ensure_seeded`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The canonical key already existed; nothing was written.
    AlreadyPresent,
    /// The seed set was written.
    Seeded { records: usize },
}

/// Parses the embedded default record set for `E`.
///
/// # Errors
/// - `RepoError::InvalidData` when the embedded JSON does not match `E`.
pub fn seed_set<E: Entity>() -> RepoResult<Vec<E>> {
    serde_json::from_str(E::SEED_JSON).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid seed data for collection `{}`: {err}",
            E::COLLECTION
        ))
    })
}

/// Writes the seed set for `E` when its canonical key is absent.
///
/// The caller must hold `collection`'s token.
pub async fn ensure_seeded<E: Entity>(collection: &Collection) -> RepoResult<SeedOutcome> {
    if collection.get(E::LIST_KEY).await?.is_some() {
        return Ok(SeedOutcome::AlreadyPresent);
    }

    let started_at = Instant::now();
    let records = seed_set::<E>()?;
    let value = serde_json::to_value(&records).map_err(|err| {
        RepoError::InvalidData(format!(
            "seed data for collection `{}` cannot be encoded: {err}",
            E::COLLECTION
        ))
    })?;
    collection.set(E::LIST_KEY, &value).await?;

    info!(
        "event=seed_apply module=seed status=ok collection={} records={} duration_ms={}",
        E::COLLECTION,
        records.len(),
        started_at.elapsed().as_millis()
    );
    Ok(SeedOutcome::Seeded {
        records: records.len(),
    })
}

/// Takes the collection token for `E` and seeds it when needed.
pub async fn seed_collection<E: Entity>(storage: &Storage) -> RepoResult<SeedOutcome> {
    let collection = storage.collection(E::COLLECTION);
    let _token = collection.lock().await;
    ensure_seeded::<E>(&collection).await
}

#[cfg(test)]
mod tests {
    use super::seed_set;
    use crate::model::clinical::{BodyChart, Evolution, Patient, TestResult};
    use crate::model::entity::Entity;
    use crate::model::reference::{
        GlossaryTerm, Link, ProtocolFavorite, RecordTemplate, StudyNote,
    };
    use std::collections::HashSet;

    fn assert_unique_ids<E: Entity>(records: &[E]) {
        let ids: HashSet<&str> = records.iter().map(|record| record.id()).collect();
        assert_eq!(ids.len(), records.len(), "duplicate seed id in {}", E::COLLECTION);
    }

    #[test]
    fn embedded_seed_sets_parse_with_unique_ids() {
        let glossary = seed_set::<GlossaryTerm>().unwrap();
        let links = seed_set::<Link>().unwrap();
        let notes = seed_set::<StudyNote>().unwrap();
        let templates = seed_set::<RecordTemplate>().unwrap();

        assert!(!glossary.is_empty());
        assert!(!links.is_empty());
        assert!(!notes.is_empty());
        assert!(!templates.is_empty());
        assert_unique_ids(&glossary);
        assert_unique_ids(&links);
        assert_unique_ids(&notes);
        assert_unique_ids(&templates);
    }

    #[test]
    fn user_data_collections_seed_empty() {
        assert!(seed_set::<Patient>().unwrap().is_empty());
        assert!(seed_set::<TestResult>().unwrap().is_empty());
        assert!(seed_set::<ProtocolFavorite>().unwrap().is_empty());
        assert!(seed_set::<Evolution>().unwrap().is_empty());
        assert!(seed_set::<BodyChart>().unwrap().is_empty());
    }
}
