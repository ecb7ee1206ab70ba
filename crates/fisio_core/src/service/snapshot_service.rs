//! Whole-store snapshot export and staged import.
//!
//! # Responsibility
//! - Export the canonical list of every snapshot collection as one document.
//! - Import a document in two phases: stage every field, then swap.
//!
//! # Invariants
//! - Export never seeds; absent collections become absent fields.
//! - A document that fails validation writes nothing.
//! - Canonical keys are only touched after every field has been staged and
//!   read back intact.
//! - Fields absent from the document leave their collections untouched.
//! - The swap phase is not atomic across collections.

use crate::model::clinical::{Patient, TestResult};
use crate::model::entity::Entity;
use crate::model::reference::{GlossaryTerm, Link, ProtocolFavorite, RecordTemplate, StudyNote};
use crate::repo::list_repo::{decode_list, ensure_unique_ids};
use crate::repo::RepoResult;
use crate::store::{Collection, Storage, StoreError};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;

const STAGED_SUFFIX: &str = "::staged";

/// Portable copy of the user-facing collections.
///
/// Each field holds the native record list verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patients: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorites: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Value>,
}

impl SnapshotDocument {
    /// Names of the fields present in this document, in snapshot order.
    pub fn present_fields(&self) -> Vec<&'static str> {
        snapshot_fields()
            .iter()
            .filter(|field| (field.slot)(self).is_some())
            .map(|field| field.name)
            .collect()
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Fields written to their canonical keys, in snapshot order.
    pub applied: Vec<&'static str>,
}

#[derive(Debug)]
pub enum SnapshotError {
    /// A field (or the whole document, `$`) does not match its record shape.
    Malformed { field: String, message: String },
    /// Storage failed outside the staging phase.
    Store(StoreError),
    /// Staging a field failed; staged keys were discarded and canonical keys
    /// were not touched.
    StagingFailed { field: &'static str, source: StoreError },
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { field, message } => {
                write!(f, "malformed snapshot field `{field}`: {message}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::StagingFailed { field, source } => {
                write!(f, "failed to stage snapshot field `{field}`: {source}")
            }
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::StagingFailed { source, .. } => Some(source),
            Self::Malformed { .. } => None,
        }
    }
}

impl From<StoreError> for SnapshotError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

struct SnapshotField {
    name: &'static str,
    collection: &'static str,
    key: &'static str,
    validate: fn(&Value) -> RepoResult<usize>,
    slot: fn(&SnapshotDocument) -> &Option<Value>,
    slot_mut: fn(&mut SnapshotDocument) -> &mut Option<Value>,
}

fn field<E: Entity>(
    name: &'static str,
    slot: fn(&SnapshotDocument) -> &Option<Value>,
    slot_mut: fn(&mut SnapshotDocument) -> &mut Option<Value>,
) -> SnapshotField {
    SnapshotField {
        name,
        collection: E::COLLECTION,
        key: E::LIST_KEY,
        validate: validate_list::<E>,
        slot,
        slot_mut,
    }
}

fn snapshot_fields() -> [SnapshotField; 7] {
    [
        field::<Patient>("patients", |doc| &doc.patients, |doc| &mut doc.patients),
        field::<TestResult>("tests", |doc| &doc.tests, |doc| &mut doc.tests),
        field::<RecordTemplate>("templates", |doc| &doc.templates, |doc| &mut doc.templates),
        field::<ProtocolFavorite>("favorites", |doc| &doc.favorites, |doc| &mut doc.favorites),
        field::<GlossaryTerm>("glossary", |doc| &doc.glossary, |doc| &mut doc.glossary),
        field::<Link>("links", |doc| &doc.links, |doc| &mut doc.links),
        field::<StudyNote>("notes", |doc| &doc.notes, |doc| &mut doc.notes),
    ]
}

fn validate_list<E: Entity>(value: &Value) -> RepoResult<usize> {
    let records = decode_list::<E>(value.clone())?;
    ensure_unique_ids(&records)?;
    Ok(records.len())
}

fn staged_key(key: &str) -> String {
    format!("{key}{STAGED_SUFFIX}")
}

/// Export/import over an explicit [`Storage`] handle.
#[derive(Clone)]
pub struct SnapshotService {
    storage: Storage,
}

impl SnapshotService {
    pub fn new(storage: &Storage) -> Self {
        Self {
            storage: storage.clone(),
        }
    }

    /// Reads every canonical list as stored.
    pub async fn export_snapshot(&self) -> SnapshotResult<SnapshotDocument> {
        let started_at = Instant::now();
        let mut document = SnapshotDocument::default();

        for field in snapshot_fields() {
            let collection = self.storage.collection(field.collection);
            let _token = collection.lock().await;
            let value = collection.get(field.key).await.map_err(|err| {
                error!(
                    "event=snapshot_export module=service status=error field={} error={err}",
                    field.name
                );
                SnapshotError::Store(err)
            })?;
            *(field.slot_mut)(&mut document) = value;
        }

        info!(
            "event=snapshot_export module=service status=ok fields={} duration_ms={}",
            document.present_fields().len(),
            started_at.elapsed().as_millis()
        );
        Ok(document)
    }

    /// Validates, stages and applies every present field of `document`.
    ///
    /// # Errors
    /// - `Malformed` when any present field is not a valid record list;
    ///   nothing is written.
    /// - `StagingFailed` when a staged write or its read-back fails; staged
    ///   keys are removed and canonical keys are unchanged.
    /// - `Store` when the swap phase fails; collections swapped before the
    ///   failure keep their new lists.
    pub async fn import_snapshot(&self, document: &SnapshotDocument) -> SnapshotResult<ImportReport> {
        let started_at = Instant::now();

        let mut pending = Vec::new();
        for field in snapshot_fields() {
            let Some(value) = (field.slot)(document).as_ref() else {
                continue;
            };
            (field.validate)(value).map_err(|err| SnapshotError::Malformed {
                field: field.name.to_string(),
                message: err.to_string(),
            })?;
            pending.push((field, value));
        }

        // Tokens are taken in snapshot order and held until the swap ends.
        let mut held: Vec<(Collection, OwnedMutexGuard<()>)> = Vec::with_capacity(pending.len());
        for (field, _) in &pending {
            let collection = self.storage.collection(field.collection);
            let token = collection.lock().await;
            held.push((collection, token));
        }

        for (index, (field, value)) in pending.iter().enumerate() {
            let collection = &held[index].0;
            if let Err(source) = stage(collection, field.key, value).await {
                error!(
                    "event=snapshot_import module=service status=error phase=stage field={} error={source}",
                    field.name
                );
                discard_staged(&pending[..=index], &held).await;
                return Err(SnapshotError::StagingFailed {
                    field: field.name,
                    source,
                });
            }
        }

        let mut applied = Vec::with_capacity(pending.len());
        for (index, (field, value)) in pending.iter().enumerate() {
            let collection = &held[index].0;
            let swapped = async {
                collection.set(field.key, value).await?;
                collection.remove(&staged_key(field.key)).await
            }
            .await;
            if let Err(err) = swapped {
                error!(
                    "event=snapshot_import module=service status=error phase=swap field={} applied={} error={err}",
                    field.name,
                    applied.len()
                );
                discard_staged(&pending[index..], &held[index..]).await;
                return Err(SnapshotError::Store(err));
            }
            applied.push(field.name);
        }

        info!(
            "event=snapshot_import module=service status=ok fields={} duration_ms={}",
            applied.len(),
            started_at.elapsed().as_millis()
        );
        Ok(ImportReport { applied })
    }

    /// Exports as pretty-printed JSON.
    pub async fn export_json(&self) -> SnapshotResult<String> {
        let document = self.export_snapshot().await?;
        serde_json::to_string_pretty(&document).map_err(|err| SnapshotError::Malformed {
            field: "$".to_string(),
            message: err.to_string(),
        })
    }

    /// Parses `text` and imports it.
    pub async fn import_json(&self, text: &str) -> SnapshotResult<ImportReport> {
        let document: SnapshotDocument =
            serde_json::from_str(text).map_err(|err| SnapshotError::Malformed {
                field: "$".to_string(),
                message: err.to_string(),
            })?;
        self.import_snapshot(&document).await
    }
}

async fn stage(collection: &Collection, key: &str, value: &Value) -> Result<(), StoreError> {
    let staged = staged_key(key);
    collection.set(&staged, value).await?;
    match collection.get(&staged).await? {
        Some(read_back) if &read_back == value => Ok(()),
        _ => Err(StoreError::unavailable(
            collection.name(),
            format!("staged value under `{staged}` did not read back intact"),
        )),
    }
}

async fn discard_staged(
    fields: &[(SnapshotField, &Value)],
    held: &[(Collection, OwnedMutexGuard<()>)],
) {
    for ((field, _), (collection, _)) in fields.iter().zip(held) {
        if let Err(err) = collection.remove(&staged_key(field.key)).await {
            warn!(
                "event=snapshot_import module=service status=error phase=discard field={} error={err}",
                field.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{snapshot_fields, staged_key, SnapshotDocument};
    use serde_json::json;

    #[test]
    fn absent_fields_are_omitted_from_json() {
        let document = SnapshotDocument {
            links: Some(json!([])),
            ..SnapshotDocument::default()
        };
        let text = serde_json::to_string(&document).unwrap();
        assert_eq!(text, r#"{"links":[]}"#);
        assert_eq!(document.present_fields(), vec!["links"]);
    }

    #[test]
    fn notes_field_maps_to_study_notes_collection() {
        let notes = snapshot_fields()
            .into_iter()
            .find(|field| field.name == "notes")
            .unwrap();
        assert_eq!(notes.collection, "studyNotes");
        assert_eq!(notes.key, "notes");
        assert_eq!(staged_key(notes.key), "notes::staged");
    }

    #[test]
    fn each_field_reads_and_writes_its_own_slot() {
        for field in snapshot_fields() {
            let mut document = SnapshotDocument::default();
            *(field.slot_mut)(&mut document) = Some(json!([]));

            assert_eq!((field.slot)(&document), &Some(json!([])));
            assert_eq!(document.present_fields(), vec![field.name]);
            assert_eq!(
                serde_json::to_value(&document).unwrap(),
                json!({ field.name: [] })
            );
        }
    }
}
