use fisio_core::db::{DbError, DbHandle};
use fisio_core::indexed::{
    ConnectionState, DatabaseSchema, IndexedError, Migration, SchemaStep, SchemaVersionManager,
    MAX_KEY,
};
use fisio_core::model::assessment::NewScaleAssessment;
use fisio_core::repo::assessment_repo::{
    AssessmentRepository, FISIOTERAPIA_DB_VERSION, FISIOTERAPIA_SCHEMA, SCALE_RESULTS_STORE,
};
use serde_json::json;

static SAMPLE: DatabaseSchema = DatabaseSchema {
    name: "sampleDB",
    migrations: &[
        Migration {
            version: 1,
            name: "create_items",
            steps: &[
                SchemaStep::CreateObjectStore {
                    store: "items",
                    key_path: "id",
                    auto_increment: true,
                },
                SchemaStep::CreateIndex {
                    store: "items",
                    index: "code",
                    key_path: "code",
                    unique: true,
                },
            ],
        },
        Migration {
            version: 2,
            name: "broken_upgrade",
            steps: &[
                SchemaStep::CreateObjectStore {
                    store: "extra",
                    key_path: "id",
                    auto_increment: false,
                },
                SchemaStep::CreateIndex {
                    store: "missing",
                    index: "owner",
                    key_path: "ownerId",
                    unique: false,
                },
            ],
        },
    ],
};

fn scale_result(patient_id: &str, scale_id: &str, date: &str, score: f64) -> NewScaleAssessment {
    NewScaleAssessment {
        scale_id: scale_id.to_string(),
        patient_id: patient_id.to_string(),
        date: date.to_string(),
        score,
        max_score: Some(100.0),
        ..NewScaleAssessment::default()
    }
}

#[tokio::test]
async fn fresh_open_creates_every_piece_of_the_version() {
    let db = DbHandle::open_in_memory().unwrap();
    let manager = SchemaVersionManager::new(db, &FISIOTERAPIA_SCHEMA);
    assert_eq!(manager.state(), ConnectionState::Unopened);

    let conn = manager.open(1).await.unwrap();

    assert_eq!(conn.version(), 1);
    assert_eq!(conn.report().previous_version, 0);
    assert_eq!(conn.report().applied_migrations, vec!["create_scale_results"]);
    assert_eq!(
        manager.state_history(),
        vec![
            ConnectionState::Unopened,
            ConnectionState::Opening,
            ConnectionState::Upgrading,
            ConnectionState::Open,
        ]
    );
    assert_eq!(conn.object_store_names().await.unwrap(), vec!["scaleResults"]);
    assert_eq!(
        conn.index_names(SCALE_RESULTS_STORE).await.unwrap(),
        vec!["patientId", "scaleId"]
    );
    assert_eq!(manager.persisted_version().await.unwrap(), 1);
}

#[tokio::test]
async fn upgrade_is_additive_and_indexes_existing_records() {
    let db = DbHandle::open_in_memory().unwrap();

    let v1 = SchemaVersionManager::new(db.clone(), &FISIOTERAPIA_SCHEMA);
    let repo_v1 = AssessmentRepository::new(v1.open(1).await.unwrap());
    let saved = repo_v1
        .save(scale_result("p1", "oswestry", "2024-02-10", 42.0))
        .await
        .unwrap();

    let v2 = SchemaVersionManager::new(db, &FISIOTERAPIA_SCHEMA);
    let conn = v2.open(FISIOTERAPIA_DB_VERSION).await.unwrap();
    assert_eq!(conn.report().previous_version, 1);
    assert_eq!(
        conn.report().applied_migrations,
        vec!["index_scale_results_by_date"]
    );
    assert_eq!(
        conn.index_names(SCALE_RESULTS_STORE).await.unwrap(),
        vec!["date", "patientId", "scaleId"]
    );

    let repo_v2 = AssessmentRepository::new(conn);
    assert_eq!(repo_v2.list_all().await.unwrap(), vec![saved.clone()]);
    assert_eq!(repo_v2.list_by_scale("oswestry").await.unwrap(), vec![saved.clone()]);
    assert_eq!(repo_v2.list_by_patient("p1").await.unwrap(), vec![saved.clone()]);
    assert_eq!(repo_v2.list_by_date("2024-02-10").await.unwrap(), vec![saved]);
}

#[tokio::test]
async fn reopening_at_the_same_version_applies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fisio.sqlite3");

    {
        let manager = SchemaVersionManager::new(DbHandle::open(&path).unwrap(), &FISIOTERAPIA_SCHEMA);
        manager.open(FISIOTERAPIA_DB_VERSION).await.unwrap();
    }

    let manager = SchemaVersionManager::new(DbHandle::open(&path).unwrap(), &FISIOTERAPIA_SCHEMA);
    let conn = manager.open(FISIOTERAPIA_DB_VERSION).await.unwrap();
    assert!(!conn.report().upgraded());
    assert!(conn.report().applied_migrations.is_empty());
    assert!(!manager
        .state_history()
        .contains(&ConnectionState::Upgrading));
}

#[tokio::test]
async fn opening_below_the_persisted_version_is_rejected() {
    let db = DbHandle::open_in_memory().unwrap();
    let manager = SchemaVersionManager::new(db, &FISIOTERAPIA_SCHEMA);
    manager.open(2).await.unwrap();

    let err = manager.open(1).await.unwrap_err();
    assert!(matches!(
        err,
        IndexedError::VersionDowngrade {
            requested: 1,
            persisted: 2,
            ..
        }
    ));
    assert_eq!(manager.state(), ConnectionState::Unopened);
    assert_eq!(manager.persisted_version().await.unwrap(), 2);
}

#[tokio::test]
async fn versions_outside_the_declared_range_are_rejected() {
    let manager = SchemaVersionManager::new(DbHandle::open_in_memory().unwrap(), &FISIOTERAPIA_SCHEMA);

    for version in [0, FISIOTERAPIA_DB_VERSION + 1] {
        assert!(matches!(
            manager.open(version).await,
            Err(IndexedError::UnsupportedVersion { .. })
        ));
    }
    assert_eq!(manager.persisted_version().await.unwrap(), 0);
}

#[tokio::test]
async fn failing_upgrade_rolls_back_every_step() {
    let db = DbHandle::open_in_memory().unwrap();
    let manager = SchemaVersionManager::new(db, &SAMPLE);
    manager.open(1).await.unwrap();

    let err = manager.open(2).await.unwrap_err();
    assert!(matches!(err, IndexedError::UnknownObjectStore(store) if store == "missing"));
    assert_eq!(manager.state(), ConnectionState::Unopened);
    assert_eq!(manager.persisted_version().await.unwrap(), 1);

    let conn = manager.open(1).await.unwrap();
    assert_eq!(conn.object_store_names().await.unwrap(), vec!["items"]);
}

#[tokio::test]
async fn missing_persisted_index_fails_the_open() {
    let db = DbHandle::open_in_memory().unwrap();
    let manager = SchemaVersionManager::new(db.clone(), &FISIOTERAPIA_SCHEMA);
    manager.open(2).await.unwrap();

    db.call(|conn| -> Result<(), DbError> {
        conn.execute_batch("DROP INDEX idx_fisioterapiaDB_scaleResults_date;")?;
        Ok(())
    })
    .await
    .unwrap();

    let err = manager.open(2).await.unwrap_err();
    match err {
        IndexedError::SchemaOpenFailed { name, message } => {
            assert_eq!(name, "fisioterapiaDB");
            assert!(message.contains("index scaleResults.date"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn records_get_generated_keys_and_respect_unique_indexes() {
    let manager = SchemaVersionManager::new(DbHandle::open_in_memory().unwrap(), &SAMPLE);
    let conn = manager.open(1).await.unwrap();

    let first = conn.add("items", json!({ "code": "a" })).await.unwrap();
    let second = conn.add("items", json!({ "code": "b" })).await.unwrap();
    assert_eq!((first, second), (1, 2));
    assert_eq!(
        conn.get("items", first).await.unwrap(),
        Some(json!({ "id": 1, "code": "a" }))
    );

    let clash = conn.add("items", json!({ "code": "a" })).await.unwrap_err();
    assert!(matches!(clash, IndexedError::ConstraintViolation { .. }));
    let duplicate_key = conn
        .add("items", json!({ "id": 2, "code": "c" }))
        .await
        .unwrap_err();
    assert!(matches!(duplicate_key, IndexedError::ConstraintViolation { .. }));

    conn.put("items", json!({ "id": 2, "code": "b2" })).await.unwrap();
    assert_eq!(
        conn.get_all_by_index("items", "code", &json!("b2")).await.unwrap(),
        vec![json!({ "id": 2, "code": "b2" })]
    );
    assert_eq!(conn.put("items", json!({ "id": 10, "code": "z" })).await.unwrap(), 10);
    assert_eq!(conn.add("items", json!({ "code": "next" })).await.unwrap(), 11);

    assert_eq!(conn.count("items").await.unwrap(), 4);
    assert!(conn.delete("items", first).await.unwrap());
    assert!(!conn.delete("items", first).await.unwrap());
    assert_eq!(conn.clear("items").await.unwrap(), 3);
    assert_eq!(conn.count("items").await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_stores_and_indexes_are_reported() {
    let manager = SchemaVersionManager::new(DbHandle::open_in_memory().unwrap(), &SAMPLE);
    let conn = manager.open(1).await.unwrap();

    assert!(matches!(
        conn.get_all("nope").await,
        Err(IndexedError::UnknownObjectStore(_))
    ));
    assert!(matches!(
        conn.get_all_by_index("items", "nope", &json!("x")).await,
        Err(IndexedError::UnknownIndex { .. })
    ));
    assert!(matches!(
        conn.add("items", json!(["not", "an", "object"])).await,
        Err(IndexedError::InvalidData(_))
    ));
}

#[tokio::test]
async fn assessment_queries_use_the_indexes() {
    let manager = SchemaVersionManager::new(DbHandle::open_in_memory().unwrap(), &FISIOTERAPIA_SCHEMA);
    let repo = AssessmentRepository::open(&manager).await.unwrap();

    let early = repo
        .save(scale_result("p1", "oswestry", "2024-01-15", 48.0))
        .await
        .unwrap();
    let late = repo
        .save(scale_result("p1", "oswestry", "2024-03-15", 30.0))
        .await
        .unwrap();
    let berg = repo
        .save(scale_result("p1", "berg", "2024-03-15", 51.0))
        .await
        .unwrap();
    let other = repo
        .save(scale_result("p2", "oswestry", "2024-02-01", 20.0))
        .await
        .unwrap();

    assert_eq!(repo.list_by_patient("p1").await.unwrap().len(), 3);
    assert_eq!(
        repo.list_by_scale("oswestry").await.unwrap(),
        vec![early.clone(), late.clone(), other]
    );
    assert_eq!(repo.list_by_date("2024-03-15").await.unwrap(), vec![late.clone(), berg]);
    assert_eq!(repo.latest_for("p1", "oswestry").await.unwrap(), Some(late.clone()));
    assert_eq!(repo.latest_for("p3", "oswestry").await.unwrap(), None);
    assert_eq!(late.normalized_score(), Some(0.3));

    let mut corrected = early.clone();
    corrected.score = 46.0;
    repo.replace(corrected.clone()).await.unwrap();
    assert_eq!(repo.get(early.id.unwrap()).await.unwrap(), Some(corrected));

    assert!(repo.delete(late.id.unwrap()).await.unwrap());
    assert_eq!(repo.get(late.id.unwrap()).await.unwrap(), None);
}

#[tokio::test]
async fn keys_beyond_the_generator_limit_are_rejected() {
    let manager = SchemaVersionManager::new(DbHandle::open_in_memory().unwrap(), &SAMPLE);
    let conn = manager.open(1).await.unwrap();

    for key in [i64::MAX, MAX_KEY + 1, i64::MIN] {
        assert!(matches!(
            conn.put("items", json!({ "id": key, "code": "x" })).await,
            Err(IndexedError::InvalidData(_))
        ));
    }
    assert_eq!(conn.count("items").await.unwrap(), 0);

    assert_eq!(
        conn.put("items", json!({ "id": MAX_KEY, "code": "last" })).await.unwrap(),
        MAX_KEY
    );
    let exhausted = conn.add("items", json!({ "code": "after" })).await.unwrap_err();
    assert!(matches!(exhausted, IndexedError::ConstraintViolation { .. }));
    assert_eq!(conn.put("items", json!({ "id": 7, "code": "seven" })).await.unwrap(), 7);
}

#[tokio::test]
async fn out_of_range_assessment_id_leaves_storage_usable() {
    let manager = SchemaVersionManager::new(DbHandle::open_in_memory().unwrap(), &FISIOTERAPIA_SCHEMA);
    let repo = AssessmentRepository::open(&manager).await.unwrap();
    let mut record = repo
        .save(scale_result("p1", "berg", "2024-04-01", 50.0))
        .await
        .unwrap();

    record.id = Some(i64::MAX);
    assert!(matches!(
        repo.replace(record).await,
        Err(IndexedError::InvalidData(_))
    ));

    let next = repo
        .save(scale_result("p1", "berg", "2024-05-01", 52.0))
        .await
        .unwrap();
    assert_eq!(next.id, Some(2));
    assert_eq!(repo.list_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn non_finite_scores_are_rejected_and_reads_keep_working() {
    let manager = SchemaVersionManager::new(DbHandle::open_in_memory().unwrap(), &FISIOTERAPIA_SCHEMA);
    let repo = AssessmentRepository::open(&manager).await.unwrap();
    let saved = repo
        .save(scale_result("p1", "eva", "2024-06-01", 4.0))
        .await
        .unwrap();

    assert!(matches!(
        repo.save(scale_result("p1", "eva", "2024-06-02", f64::NAN)).await,
        Err(IndexedError::InvalidData(_))
    ));
    let mut bad_max = saved.clone();
    bad_max.max_score = Some(f64::INFINITY);
    assert!(matches!(
        repo.replace(bad_max).await,
        Err(IndexedError::InvalidData(_))
    ));

    assert_eq!(repo.list_all().await.unwrap(), vec![saved.clone()]);
    assert_eq!(repo.latest_for("p1", "eva").await.unwrap(), Some(saved));
}
