//! Patient-centred repositories.

use crate::model::clinical::{BodyChart, BodyView, Evolution, Patient, TestResult};
use crate::repo::list_repo::ListRepository;
use crate::repo::RepoResult;
use std::cmp::Reverse;

pub type PatientRepository = ListRepository<Patient>;
pub type TestResultRepository = ListRepository<TestResult>;
pub type EvolutionRepository = ListRepository<Evolution>;
pub type BodyChartRepository = ListRepository<BodyChart>;

impl ListRepository<Patient> {
    /// Case-insensitive substring match on the patient name. A blank query
    /// returns every patient.
    pub async fn search_by_name(&self, query: &str) -> RepoResult<Vec<Patient>> {
        let needle = query.trim().to_lowercase();
        self.find_all(|patient| needle.is_empty() || patient.name.to_lowercase().contains(&needle))
            .await
    }
}

impl ListRepository<TestResult> {
    /// Test results of one patient, newest `date` first.
    pub async fn list_for_patient(&self, patient_id: &str) -> RepoResult<Vec<TestResult>> {
        let mut results = self
            .find_all(|result| result.patient_id == patient_id)
            .await?;
        results.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(results)
    }
}

impl ListRepository<Evolution> {
    /// Evolution entries of one patient, newest `date` first.
    pub async fn list_for_patient(&self, patient_id: &str) -> RepoResult<Vec<Evolution>> {
        let mut entries = self
            .find_all(|entry| entry.patient_id == patient_id)
            .await?;
        entries.sort_by_key(|entry| (Reverse(entry.date.clone()), Reverse(entry.created_at)));
        Ok(entries)
    }

    /// Flips the `reviewed` flag. Returns `None` when the entry is missing.
    pub async fn toggle_reviewed(&self, id: &str) -> RepoResult<Option<Evolution>> {
        self.modify(id, |entry| entry.reviewed = !entry.reviewed)
            .await
    }
}

impl ListRepository<BodyChart> {
    /// Body charts of one patient, optionally restricted to one view.
    pub async fn for_patient(
        &self,
        patient_id: &str,
        view: Option<BodyView>,
    ) -> RepoResult<Vec<BodyChart>> {
        self.find_all(|chart| {
            chart.patient_id == patient_id && view.map_or(true, |view| chart.view == view)
        })
        .await
    }
}
