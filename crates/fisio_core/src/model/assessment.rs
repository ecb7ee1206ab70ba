//! Assessment scale results stored in the indexed `scaleResults` store.
//!
//! # Invariants
//! - `id` is assigned by the indexed store on first save and is `None`
//!   before that.
//! - `scale_id`, `patient_id` and `date` are the indexed lookup fields.
//! - `score` and `max_score` are finite; JSON has no encoding for NaN or
//!   infinities.

use super::entity::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Scored outcome of one standardized scale (e.g. Oswestry, Berg, EVA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleAssessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub scale_id: String,
    pub patient_id: RecordId,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    /// Raw item answers keyed by question id.
    #[serde(default)]
    pub answers: Map<String, Value>,
    pub created_at: Timestamp,
}

/// Input for saving a new scale result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewScaleAssessment {
    pub scale_id: String,
    pub patient_id: RecordId,
    pub date: String,
    pub score: f64,
    pub max_score: Option<f64>,
    pub interpretation: Option<String>,
    pub answers: Map<String, Value>,
}

impl ScaleAssessment {
    pub fn from_new(input: NewScaleAssessment, now: Timestamp) -> Self {
        Self {
            id: None,
            scale_id: input.scale_id,
            patient_id: input.patient_id,
            date: input.date,
            score: input.score,
            max_score: input.max_score,
            interpretation: input.interpretation,
            answers: input.answers,
            created_at: now,
        }
    }

    /// Rejects scores that cannot be stored as JSON numbers.
    pub fn validate(&self) -> Result<(), String> {
        if !self.score.is_finite() {
            return Err(format!("score {} is not a finite number", self.score));
        }
        match self.max_score {
            Some(max) if !max.is_finite() => {
                Err(format!("max score {max} is not a finite number"))
            }
            _ => Ok(()),
        }
    }

    /// Score as a fraction of `max_score`, when the scale declares one.
    pub fn normalized_score(&self) -> Option<f64> {
        match self.max_score {
            Some(max) if max > 0.0 => Some(self.score / max),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NewScaleAssessment, ScaleAssessment};
    use chrono::Utc;

    fn assessment(score: f64, max_score: Option<f64>) -> ScaleAssessment {
        ScaleAssessment::from_new(
            NewScaleAssessment {
                scale_id: "eva".to_string(),
                patient_id: "p1".to_string(),
                date: "2024-06-01".to_string(),
                score,
                max_score,
                ..NewScaleAssessment::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn validate_rejects_non_finite_scores() {
        assert!(assessment(7.0, Some(10.0)).validate().is_ok());
        assert!(assessment(f64::NAN, None).validate().is_err());
        assert!(assessment(f64::INFINITY, None).validate().is_err());
        assert!(assessment(3.0, Some(f64::NEG_INFINITY)).validate().is_err());
    }
}
