use fisio_core::model::clinical::{PatientDraft, TestResultDraft};
use fisio_core::model::reference::{
    GlossaryTermDraft, LinkDraft, ProtocolFavoriteDraft, RecordTemplateDraft, StudyNoteDraft,
};
use fisio_core::repo::clinical_repo::{PatientRepository, TestResultRepository};
use fisio_core::repo::reference_repo::{
    GlossaryRepository, LinkRepository, ProtocolFavoriteRepository, RecordTemplateRepository,
    StudyNoteRepository,
};
use fisio_core::service::snapshot_service::SnapshotService;
use fisio_core::{MemoryEngine, SnapshotDocument, SnapshotError, SqliteEngine, Storage};
use serde_json::json;
use std::sync::Arc;

fn memory() -> (MemoryEngine, Storage) {
    let engine = MemoryEngine::new();
    let storage = Storage::new(Arc::new(engine.clone()));
    (engine, storage)
}

async fn populate(storage: &Storage) {
    PatientRepository::from_storage(storage)
        .add(PatientDraft {
            name: "Ana Souza".to_string(),
            ..PatientDraft::default()
        })
        .await
        .unwrap();
    TestResultRepository::from_storage(storage)
        .add(TestResultDraft {
            patient_id: "p1".to_string(),
            test_name: "Phalen".to_string(),
            result: "negativo".to_string(),
            date: "2024-05-20".to_string(),
            ..TestResultDraft::default()
        })
        .await
        .unwrap();
    LinkRepository::from_storage(storage)
        .add(LinkDraft {
            title: "Diretrizes".to_string(),
            url: "https://example.org".to_string(),
            ..LinkDraft::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn export_then_import_into_empty_store_reproduces_lists() {
    let source = Storage::new(Arc::new(SqliteEngine::open_in_memory().unwrap()));
    populate(&source).await;
    let text = SnapshotService::new(&source).export_json().await.unwrap();

    let (_engine, target) = memory();
    let report = SnapshotService::new(&target).import_json(&text).await.unwrap();
    assert_eq!(report.applied, vec!["patients", "tests", "links"]);

    assert_eq!(
        PatientRepository::from_storage(&target).get_all().await.unwrap(),
        PatientRepository::from_storage(&source).get_all().await.unwrap()
    );
    assert_eq!(
        TestResultRepository::from_storage(&target).get_all().await.unwrap(),
        TestResultRepository::from_storage(&source).get_all().await.unwrap()
    );
    assert_eq!(
        LinkRepository::from_storage(&target).get_all().await.unwrap(),
        LinkRepository::from_storage(&source).get_all().await.unwrap()
    );
}

#[tokio::test]
async fn export_then_import_into_same_store_keeps_every_collection() {
    let (engine, storage) = memory();
    populate(&storage).await;
    RecordTemplateRepository::from_storage(&storage)
        .add(RecordTemplateDraft {
            name: "Avaliação inicial".to_string(),
            content: "Queixa principal:".to_string(),
            ..RecordTemplateDraft::default()
        })
        .await
        .unwrap();
    ProtocolFavoriteRepository::from_storage(&storage)
        .add(ProtocolFavoriteDraft {
            protocol_id: "lca-pos-op".to_string(),
            title: "Pós-operatório de LCA".to_string(),
            ..ProtocolFavoriteDraft::default()
        })
        .await
        .unwrap();
    GlossaryRepository::from_storage(&storage)
        .add(GlossaryTermDraft {
            term: "Propriocepção".to_string(),
            definition: "Percepção da posição corporal.".to_string(),
            ..GlossaryTermDraft::default()
        })
        .await
        .unwrap();
    StudyNoteRepository::from_storage(&storage)
        .add(StudyNoteDraft {
            title: "Manguito rotador".to_string(),
            content: "Revisar testes especiais.".to_string(),
            tags: vec!["ombro".to_string()],
            ..StudyNoteDraft::default()
        })
        .await
        .unwrap();

    let canonical = [
        ("patients", "patients"),
        ("tests", "tests"),
        ("templates", "templates"),
        ("favorites", "favorites"),
        ("glossary", "glossary"),
        ("links", "links"),
        ("studyNotes", "notes"),
    ];
    let before: Vec<_> = canonical
        .iter()
        .map(|(collection, key)| engine.raw_value(collection, key))
        .collect();
    assert!(before.iter().all(Option::is_some));

    let service = SnapshotService::new(&storage);
    let document = service.export_snapshot().await.unwrap();
    let report = service.import_snapshot(&document).await.unwrap();

    assert_eq!(
        report.applied,
        vec!["patients", "tests", "templates", "favorites", "glossary", "links", "notes"]
    );
    for ((collection, key), expected) in canonical.iter().zip(before) {
        assert_eq!(engine.raw_value(collection, key), expected, "{collection}/{key}");
        assert_eq!(engine.raw_keys(collection), vec![key.to_string()]);
    }
}

#[tokio::test]
async fn export_omits_untouched_collections_and_does_not_seed() {
    let (engine, storage) = memory();
    let document = SnapshotService::new(&storage).export_snapshot().await.unwrap();

    assert_eq!(document, SnapshotDocument::default());
    assert_eq!(engine.write_count("glossary"), 0);
    assert_eq!(
        serde_json::to_value(&document).unwrap(),
        json!({})
    );
}

#[tokio::test]
async fn partial_document_leaves_other_collections_untouched() {
    let (_engine, storage) = memory();
    populate(&storage).await;
    let patients_before = PatientRepository::from_storage(&storage).get_all().await.unwrap();

    let document = SnapshotDocument {
        links: Some(json!([])),
        ..SnapshotDocument::default()
    };
    let report = SnapshotService::new(&storage)
        .import_snapshot(&document)
        .await
        .unwrap();

    assert_eq!(report.applied, vec!["links"]);
    assert!(LinkRepository::from_storage(&storage).get_all().await.unwrap().is_empty());
    assert_eq!(
        PatientRepository::from_storage(&storage).get_all().await.unwrap(),
        patients_before
    );
}

#[tokio::test]
async fn malformed_field_writes_nothing() {
    let (engine, storage) = memory();
    populate(&storage).await;
    let writes_before = engine.write_count("patients") + engine.write_count("links");

    let document = SnapshotDocument {
        patients: Some(json!([])),
        links: Some(json!([{ "id": "x", "title": 5 }])),
        ..SnapshotDocument::default()
    };
    let err = SnapshotService::new(&storage)
        .import_snapshot(&document)
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::Malformed { ref field, .. } if field == "links"));
    assert_eq!(
        engine.write_count("patients") + engine.write_count("links"),
        writes_before
    );
    assert_eq!(
        PatientRepository::from_storage(&storage).count().await.unwrap(),
        1
    );
}

#[tokio::test]
async fn duplicate_ids_in_a_field_are_malformed() {
    let (_engine, storage) = memory();
    let term = json!({
        "id": "g1",
        "term": "Goniometria",
        "definition": "Medida da amplitude articular.",
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z"
    });
    let document = SnapshotDocument {
        glossary: Some(json!([term.clone(), term])),
        ..SnapshotDocument::default()
    };

    let err = SnapshotService::new(&storage)
        .import_snapshot(&document)
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::Malformed { ref field, .. } if field == "glossary"));
}

#[tokio::test]
async fn unparseable_json_is_malformed_at_root() {
    let (_engine, storage) = memory();
    let err = SnapshotService::new(&storage)
        .import_json("{ not json")
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::Malformed { ref field, .. } if field == "$"));
}

#[tokio::test]
async fn staging_failure_keeps_canonical_data_and_clears_staged_keys() {
    let (engine, storage) = memory();
    populate(&storage).await;
    let patients_before = engine.raw_value("patients", "patients");
    let links_before = engine.raw_value("links", "links");

    engine.reject_writes_for("links");
    let document = SnapshotDocument {
        patients: Some(json!([])),
        links: Some(json!([])),
        ..SnapshotDocument::default()
    };
    let err = SnapshotService::new(&storage)
        .import_snapshot(&document)
        .await
        .unwrap_err();
    engine.accept_all_writes();

    assert!(matches!(err, SnapshotError::StagingFailed { field: "links", .. }));
    assert_eq!(engine.raw_value("patients", "patients"), patients_before);
    assert_eq!(engine.raw_value("links", "links"), links_before);
    assert_eq!(engine.raw_keys("patients"), vec!["patients".to_string()]);
    assert_eq!(engine.raw_keys("links"), vec!["links".to_string()]);
}

#[tokio::test]
async fn imported_empty_glossary_is_not_reseeded() {
    let (_engine, storage) = memory();
    SnapshotService::new(&storage)
        .import_json(r#"{ "glossary": [] }"#)
        .await
        .unwrap();

    assert!(GlossaryRepository::from_storage(&storage)
        .get_all()
        .await
        .unwrap()
        .is_empty());
}
