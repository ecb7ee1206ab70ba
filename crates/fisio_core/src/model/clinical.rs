//! Patient-centred records: patients, test results, evolutions, body charts.
//!
//! # Invariants
//! - `patient_id` references are not enforced by storage; callers own
//!   referential integrity across collections.
//! - Dates without time (`date`, `birth_date`) are `YYYY-MM-DD` strings.

use super::entity::{advance_timestamp, Entity, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientDraft {
    pub name: String,
    pub birth_date: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for Patient {
    type Draft = PatientDraft;
    type Patch = PatientPatch;

    const COLLECTION: &'static str = "patients";
    const LIST_KEY: &'static str = "patients";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: PatientDraft) -> Self {
        Self {
            id,
            name: draft.name,
            birth_date: draft.birth_date,
            phone: draft.phone,
            email: draft.email,
            diagnosis: draft.diagnosis,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }
}

/// Result of one functional test applied to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub date: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestResultDraft {
    pub patient_id: RecordId,
    pub test_name: String,
    pub category: Option<String>,
    pub result: String,
    pub score: Option<f64>,
    pub notes: Option<String>,
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Entity for TestResult {
    type Draft = TestResultDraft;
    type Patch = TestResultPatch;

    const COLLECTION: &'static str = "tests";
    const LIST_KEY: &'static str = "tests";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: TestResultDraft) -> Self {
        Self {
            id,
            patient_id: draft.patient_id,
            test_name: draft.test_name,
            category: draft.category,
            result: draft.result,
            score: draft.score,
            notes: draft.notes,
            date: draft.date,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }

    fn validate(&self) -> Result<(), String> {
        finite_score(self.score)
    }

    fn validate_patch(patch: &TestResultPatch) -> Result<(), String> {
        finite_score(patch.score)
    }
}

/// JSON encodes NaN and infinities as `null`, which would drop the score.
fn finite_score(score: Option<f64>) -> Result<(), String> {
    match score {
        Some(score) if !score.is_finite() => {
            Err(format!("score {score} is not a finite number"))
        }
        _ => Ok(()),
    }
}

/// SOAP-style evolution entry for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evolution {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub date: String,
    #[serde(default)]
    pub subjective: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub reviewed: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvolutionDraft {
    pub patient_id: RecordId,
    pub date: String,
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed: Option<bool>,
}

impl Entity for Evolution {
    type Draft = EvolutionDraft;
    type Patch = EvolutionPatch;

    const COLLECTION: &'static str = "evolutions";
    const LIST_KEY: &'static str = "evolutions";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: EvolutionDraft) -> Self {
        Self {
            id,
            patient_id: draft.patient_id,
            date: draft.date,
            subjective: draft.subjective,
            objective: draft.objective,
            assessment: draft.assessment,
            plan: draft.plan,
            reviewed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }
}

/// Which side of the body diagram a chart annotates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyView {
    #[default]
    Front,
    Back,
}

/// One pain/region marker placed on the body diagram.
///
/// `x` and `y` are relative coordinates in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyMarker {
    pub x: f64,
    pub y: f64,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pain_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyChart {
    pub id: RecordId,
    pub patient_id: RecordId,
    #[serde(default)]
    pub view: BodyView,
    #[serde(default)]
    pub markers: Vec<BodyMarker>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyChartDraft {
    pub patient_id: RecordId,
    pub view: BodyView,
    pub markers: Vec<BodyMarker>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyChartPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<BodyView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers: Option<Vec<BodyMarker>>,
}

impl Entity for BodyChart {
    type Draft = BodyChartDraft;
    type Patch = BodyChartPatch;

    const COLLECTION: &'static str = "bodyCharts";
    const LIST_KEY: &'static str = "bodyCharts";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: BodyChartDraft) -> Self {
        Self {
            id,
            patient_id: draft.patient_id,
            view: draft.view,
            markers: draft.markers,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }
}
