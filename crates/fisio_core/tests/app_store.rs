use fisio_core::config::ENV_DATA_DIR;
use fisio_core::model::assessment::NewScaleAssessment;
use fisio_core::model::clinical::PatientDraft;
use fisio_core::repo::assessment_repo::FISIOTERAPIA_DB_VERSION;
use fisio_core::{CoreConfig, FisioStore, SeedOutcome};

#[tokio::test]
async fn in_memory_store_opens_indexed_db_at_current_version() {
    let store = FisioStore::open_in_memory().await.unwrap();
    assert_eq!(
        store.indexed().persisted_version().await.unwrap(),
        FISIOTERAPIA_DB_VERSION
    );
    assert_eq!(
        store.assessments.connection().version(),
        FISIOTERAPIA_DB_VERSION
    );
}

#[tokio::test]
async fn seed_all_then_stats_reports_seeded_counts() {
    let store = FisioStore::open_in_memory().await.unwrap();

    let outcomes = store.seed_all().await.unwrap();
    let glossary = outcomes
        .iter()
        .find(|(collection, _)| *collection == "glossary")
        .unwrap();
    assert!(matches!(glossary.1, SeedOutcome::Seeded { records } if records > 0));
    assert!(store
        .seed_all()
        .await
        .unwrap()
        .iter()
        .all(|(_, outcome)| *outcome == SeedOutcome::AlreadyPresent));

    let stats = store.collection_stats().await.unwrap();
    assert_eq!(stats.len(), 9);
    let patients = stats.iter().find(|stat| stat.collection == "patients").unwrap();
    assert_eq!(patients.records, 0);
}

#[tokio::test]
async fn on_disk_store_keeps_data_between_opens() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("fisio");
    let data_dir_text = data_dir.to_str().unwrap().to_string();
    let config = CoreConfig::from_lookup(|key| {
        (key == ENV_DATA_DIR).then(|| data_dir_text.clone())
    })
    .unwrap();

    {
        let store = FisioStore::open(&config).await.unwrap();
        store
            .patients
            .add(PatientDraft {
                name: "Ana Souza".to_string(),
                ..PatientDraft::default()
            })
            .await
            .unwrap();
        store
            .assessments
            .save(NewScaleAssessment {
                scale_id: "eva".to_string(),
                patient_id: "p1".to_string(),
                date: "2024-06-01".to_string(),
                score: 4.0,
                ..NewScaleAssessment::default()
            })
            .await
            .unwrap();
    }

    assert!(config.db_path().exists());
    let store = FisioStore::open(&config).await.unwrap();
    assert_eq!(store.patients.count().await.unwrap(), 1);
    assert_eq!(store.assessments.list_by_patient("p1").await.unwrap().len(), 1);
    assert!(!store.assessments.connection().report().upgraded());
}
