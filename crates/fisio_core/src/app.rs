//! Application container wiring storage, repositories and services.
//!
//! # Responsibility
//! - Build every repository over one explicitly constructed [`Storage`].
//! - Open `fisioterapiaDB` at its current version before handing out the
//!   container.
//!
//! # Invariants
//! - All repositories of one container share the same storage and tokens.
//! - No store is reachable through process-wide state.

use crate::config::CoreConfig;
use crate::db::{DbError, DbHandle};
use crate::indexed::{IndexedError, SchemaVersionManager};
use crate::model::clinical::{BodyChart, Evolution, Patient, TestResult};
use crate::model::entity::Entity;
use crate::model::reference::{GlossaryTerm, Link, ProtocolFavorite, RecordTemplate, StudyNote};
use crate::repo::assessment_repo::{AssessmentRepository, FISIOTERAPIA_SCHEMA};
use crate::repo::clinical_repo::{
    BodyChartRepository, EvolutionRepository, PatientRepository, TestResultRepository,
};
use crate::repo::reference_repo::{
    GlossaryRepository, LinkRepository, ProtocolFavoriteRepository, RecordTemplateRepository,
    StudyNoteRepository,
};
use crate::repo::RepoResult;
use crate::seed::{seed_collection, SeedOutcome};
use crate::service::snapshot_service::SnapshotService;
use crate::store::{SqliteEngine, Storage};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum OpenError {
    CreateDataDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Db(DbError),
    Indexed(IndexedError),
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDataDir { path, source } => write!(
                f,
                "failed to create data directory `{}`: {source}",
                path.display()
            ),
            Self::Db(err) => write!(f, "{err}"),
            Self::Indexed(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OpenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDataDir { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::Indexed(err) => Some(err),
        }
    }
}

impl From<DbError> for OpenError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<IndexedError> for OpenError {
    fn from(value: IndexedError) -> Self {
        Self::Indexed(value)
    }
}

/// Record count of one list collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStat {
    pub collection: &'static str,
    pub records: usize,
}

/// Every repository and service of the local store.
pub struct FisioStore {
    storage: Storage,
    pub patients: PatientRepository,
    pub tests: TestResultRepository,
    pub evolutions: EvolutionRepository,
    pub body_charts: BodyChartRepository,
    pub favorites: ProtocolFavoriteRepository,
    pub glossary: GlossaryRepository,
    pub links: LinkRepository,
    pub notes: StudyNoteRepository,
    pub templates: RecordTemplateRepository,
    pub assessments: AssessmentRepository,
    pub snapshots: SnapshotService,
    indexed: Arc<SchemaVersionManager>,
}

impl FisioStore {
    /// Opens the on-disk store described by `config`.
    pub async fn open(config: &CoreConfig) -> Result<Self, OpenError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| {
            OpenError::CreateDataDir {
                path: config.data_dir.clone(),
                source,
            }
        })?;
        let db = DbHandle::open(config.db_path())?;
        Self::with_sqlite(db).await
    }

    /// Opens a private in-memory store.
    pub async fn open_in_memory() -> Result<Self, OpenError> {
        Self::with_sqlite(DbHandle::open_in_memory()?).await
    }

    /// Wires repositories over `storage`; `db` backs the indexed store.
    pub async fn with_storage(storage: Storage, db: DbHandle) -> Result<Self, OpenError> {
        let started_at = Instant::now();
        let indexed = Arc::new(SchemaVersionManager::new(db, &FISIOTERAPIA_SCHEMA));
        let assessments = AssessmentRepository::open(&indexed).await.map_err(|err| {
            error!("event=store_open module=app status=error error={err}");
            OpenError::Indexed(err)
        })?;

        info!(
            "event=store_open module=app status=ok indexed_version={} duration_ms={}",
            assessments.connection().version(),
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            patients: PatientRepository::from_storage(&storage),
            tests: TestResultRepository::from_storage(&storage),
            evolutions: EvolutionRepository::from_storage(&storage),
            body_charts: BodyChartRepository::from_storage(&storage),
            favorites: ProtocolFavoriteRepository::from_storage(&storage),
            glossary: GlossaryRepository::from_storage(&storage),
            links: LinkRepository::from_storage(&storage),
            notes: StudyNoteRepository::from_storage(&storage),
            templates: RecordTemplateRepository::from_storage(&storage),
            snapshots: SnapshotService::new(&storage),
            assessments,
            indexed,
            storage,
        })
    }

    async fn with_sqlite(db: DbHandle) -> Result<Self, OpenError> {
        let storage = Storage::new(Arc::new(SqliteEngine::new(db.clone())));
        Self::with_storage(storage, db).await
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Version manager of `fisioterapiaDB`.
    pub fn indexed(&self) -> &SchemaVersionManager {
        &self.indexed
    }

    /// Seeds every list collection that was never populated.
    pub async fn seed_all(&self) -> RepoResult<Vec<(&'static str, SeedOutcome)>> {
        let storage = &self.storage;
        Ok(vec![
            (Patient::COLLECTION, seed_collection::<Patient>(storage).await?),
            (TestResult::COLLECTION, seed_collection::<TestResult>(storage).await?),
            (Evolution::COLLECTION, seed_collection::<Evolution>(storage).await?),
            (BodyChart::COLLECTION, seed_collection::<BodyChart>(storage).await?),
            (
                ProtocolFavorite::COLLECTION,
                seed_collection::<ProtocolFavorite>(storage).await?,
            ),
            (GlossaryTerm::COLLECTION, seed_collection::<GlossaryTerm>(storage).await?),
            (Link::COLLECTION, seed_collection::<Link>(storage).await?),
            (StudyNote::COLLECTION, seed_collection::<StudyNote>(storage).await?),
            (
                RecordTemplate::COLLECTION,
                seed_collection::<RecordTemplate>(storage).await?,
            ),
        ])
    }

    /// Record counts of every list collection (seeding on first access).
    pub async fn collection_stats(&self) -> RepoResult<Vec<CollectionStat>> {
        let stat = |collection: &'static str, records: usize| CollectionStat {
            collection,
            records,
        };
        Ok(vec![
            stat(Patient::COLLECTION, self.patients.count().await?),
            stat(TestResult::COLLECTION, self.tests.count().await?),
            stat(Evolution::COLLECTION, self.evolutions.count().await?),
            stat(BodyChart::COLLECTION, self.body_charts.count().await?),
            stat(ProtocolFavorite::COLLECTION, self.favorites.count().await?),
            stat(GlossaryTerm::COLLECTION, self.glossary.count().await?),
            stat(Link::COLLECTION, self.links.count().await?),
            stat(StudyNote::COLLECTION, self.notes.count().await?),
            stat(RecordTemplate::COLLECTION, self.templates.count().await?),
        ])
    }
}
