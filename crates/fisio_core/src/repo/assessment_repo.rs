//! Scale assessment results in the `fisioterapiaDB` indexed database.
//!
//! # Responsibility
//! - Declare the versioned layout of `fisioterapiaDB`.
//! - Map [`ScaleAssessment`] records to `scaleResults` and its indexes.
//!
//! # Invariants
//! - Version 1 creates `scaleResults` with `scaleId` and `patientId`;
//!   version 2 only adds `date`.
//! - Saved records always carry the id assigned by the store.
//! - Records with non-finite scores are rejected before anything is written.

use crate::indexed::{
    DatabaseSchema, IndexedConnection, IndexedError, IndexedResult, Migration,
    SchemaStep, SchemaVersionManager,
};
use crate::model::assessment::{NewScaleAssessment, ScaleAssessment};
use chrono::Utc;
use serde_json::Value;

pub const FISIOTERAPIA_DB_NAME: &str = "fisioterapiaDB";
pub const SCALE_RESULTS_STORE: &str = "scaleResults";
pub const FISIOTERAPIA_DB_VERSION: u32 = 2;

const BY_SCALE: &str = "scaleId";
const BY_PATIENT: &str = "patientId";
const BY_DATE: &str = "date";

pub static FISIOTERAPIA_SCHEMA: DatabaseSchema = DatabaseSchema {
    name: FISIOTERAPIA_DB_NAME,
    migrations: &[
        Migration {
            version: 1,
            name: "create_scale_results",
            steps: &[
                SchemaStep::CreateObjectStore {
                    store: SCALE_RESULTS_STORE,
                    key_path: "id",
                    auto_increment: true,
                },
                SchemaStep::CreateIndex {
                    store: SCALE_RESULTS_STORE,
                    index: BY_SCALE,
                    key_path: "scaleId",
                    unique: false,
                },
                SchemaStep::CreateIndex {
                    store: SCALE_RESULTS_STORE,
                    index: BY_PATIENT,
                    key_path: "patientId",
                    unique: false,
                },
            ],
        },
        Migration {
            version: 2,
            name: "index_scale_results_by_date",
            steps: &[SchemaStep::CreateIndex {
                store: SCALE_RESULTS_STORE,
                index: BY_DATE,
                key_path: "date",
                unique: false,
            }],
        },
    ],
};

/// Typed access to `scaleResults`.
#[derive(Clone)]
pub struct AssessmentRepository {
    conn: IndexedConnection,
}

impl AssessmentRepository {
    pub fn new(conn: IndexedConnection) -> Self {
        Self { conn }
    }

    /// Opens `fisioterapiaDB` at the current version through `manager`.
    pub async fn open(manager: &SchemaVersionManager) -> IndexedResult<Self> {
        manager
            .open(FISIOTERAPIA_DB_VERSION)
            .await
            .map(Self::new)
    }

    pub fn connection(&self) -> &IndexedConnection {
        &self.conn
    }

    /// Stores a new result and returns it with its assigned id.
    pub async fn save(&self, input: NewScaleAssessment) -> IndexedResult<ScaleAssessment> {
        let mut record = ScaleAssessment::from_new(input, Utc::now());
        let id = self.conn.add(SCALE_RESULTS_STORE, encode(&record)?).await?;
        record.id = Some(id);
        Ok(record)
    }

    /// Overwrites a stored result. A record without id is inserted.
    pub async fn replace(&self, record: ScaleAssessment) -> IndexedResult<ScaleAssessment> {
        let mut record = record;
        let id = self.conn.put(SCALE_RESULTS_STORE, encode(&record)?).await?;
        record.id = Some(id);
        Ok(record)
    }

    pub async fn get(&self, id: i64) -> IndexedResult<Option<ScaleAssessment>> {
        self.conn
            .get(SCALE_RESULTS_STORE, id)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn list_all(&self) -> IndexedResult<Vec<ScaleAssessment>> {
        decode_all(self.conn.get_all(SCALE_RESULTS_STORE).await?)
    }

    pub async fn list_by_scale(&self, scale_id: &str) -> IndexedResult<Vec<ScaleAssessment>> {
        self.by_index(BY_SCALE, scale_id).await
    }

    pub async fn list_by_patient(&self, patient_id: &str) -> IndexedResult<Vec<ScaleAssessment>> {
        self.by_index(BY_PATIENT, patient_id).await
    }

    /// Results recorded on `date` (`YYYY-MM-DD`).
    pub async fn list_by_date(&self, date: &str) -> IndexedResult<Vec<ScaleAssessment>> {
        self.by_index(BY_DATE, date).await
    }

    /// Most recent result of `scale_id` for `patient_id`, by date then id.
    pub async fn latest_for(
        &self,
        patient_id: &str,
        scale_id: &str,
    ) -> IndexedResult<Option<ScaleAssessment>> {
        Ok(self
            .list_by_patient(patient_id)
            .await?
            .into_iter()
            .filter(|result| result.scale_id == scale_id)
            .max_by(|left, right| {
                left.date
                    .cmp(&right.date)
                    .then_with(|| left.id.cmp(&right.id))
            }))
    }

    /// Deletes one result. Returns `false` when the id was absent.
    pub async fn delete(&self, id: i64) -> IndexedResult<bool> {
        self.conn.delete(SCALE_RESULTS_STORE, id).await
    }

    async fn by_index(&self, index: &str, key: &str) -> IndexedResult<Vec<ScaleAssessment>> {
        decode_all(
            self.conn
                .get_all_by_index(SCALE_RESULTS_STORE, index, &Value::from(key))
                .await?,
        )
    }
}

fn encode(record: &ScaleAssessment) -> IndexedResult<Value> {
    record.validate().map_err(IndexedError::InvalidData)?;
    serde_json::to_value(record).map_err(|err| IndexedError::InvalidData(err.to_string()))
}

fn decode(value: Value) -> IndexedResult<ScaleAssessment> {
    serde_json::from_value(value).map_err(|err| {
        IndexedError::InvalidData(format!("scale result does not match record shape: {err}"))
    })
}

fn decode_all(values: Vec<Value>) -> IndexedResult<Vec<ScaleAssessment>> {
    values.into_iter().map(decode).collect()
}
