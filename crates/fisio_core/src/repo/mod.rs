//! Repository layer over collections and the indexed store.
//!
//! # Responsibility
//! - Provide typed CRUD façades, one per entity type.
//! - Keep list-rewrite mechanics and seeding out of callers.
//!
//! # Invariants
//! - Each repository exclusively owns its collection.
//! - A missing id is reported through `Option`/`bool`, never as an error.
//! - Every read-modify-write holds the collection token for its duration.

use crate::model::entity::RecordId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod assessment_repo;
pub mod clinical_repo;
pub mod list_repo;
pub mod reference_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for list persistence.
#[derive(Debug)]
pub enum RepoError {
    Store(StoreError),
    /// Persisted or provided data does not match the record shape.
    InvalidData(String),
    /// A list write would hold two records with the same id.
    DuplicateId(RecordId),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
            Self::DuplicateId(id) => write!(f, "duplicate record id: {id}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::InvalidData(_) | Self::DuplicateId(_) => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
