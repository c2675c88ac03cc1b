use std::fs;
use std::io;

use dictionary_migrate::error::StoreError;
use dictionary_migrate::store::{Document, DocumentStore, JsonFileStore};
use dictionary_migrate::{migrate_collection, DEFAULT_COLLECTION};
use serde_json::{json, Value};
use tempfile::tempdir;

fn seed(store: &JsonFileStore, docs: Value) {
    fs::write(store.collection_path(DEFAULT_COLLECTION), docs.to_string()).unwrap();
}

fn field<'a>(docs: &'a [(String, Document)], id: &str, key: &str) -> &'a Value {
    let (_, doc) = docs.iter().find(|(doc_id, _)| doc_id == id).unwrap();
    doc.get(key).unwrap()
}

#[test]
fn normalizes_every_document_and_keeps_other_fields() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed(
        &store,
        json!({
            "aspirin": {
                "zh": "阿斯匹靈,伯基",
                "en": " Aspirin ",
                "alias": ["ASA"],
                "atc": "B01AC06"
            },
            "panadol": {"zh": ["普拿疼"], "en": "Panadol", "alias": []},
            "blank": {"dosage": "n/a"}
        }),
    );

    let report = migrate_collection(&store, DEFAULT_COLLECTION).unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.updated, 3);
    assert!(report.failed.is_empty());

    let docs = store.list(DEFAULT_COLLECTION).unwrap();
    assert_eq!(field(&docs, "aspirin", "zh"), &json!(["阿斯匹靈", "伯基"]));
    assert_eq!(field(&docs, "aspirin", "en"), &json!("Aspirin"));
    assert_eq!(field(&docs, "aspirin", "alias"), &json!(["aspirin", "asa"]));
    assert_eq!(field(&docs, "aspirin", "atc"), &json!("B01AC06"));
    let keywords = field(&docs, "aspirin", "keywords").as_array().unwrap();
    for expected in ["a", "as", "asp", "aspirin", "阿", "阿斯匹靈", "伯基"] {
        assert!(keywords.contains(&json!(expected)), "missing keyword {expected}");
    }

    assert_eq!(field(&docs, "blank", "zh"), &json!(""));
    assert_eq!(field(&docs, "blank", "keywords"), &json!([]));
    assert_eq!(field(&docs, "blank", "dosage"), &json!("n/a"));
}

#[test]
fn second_run_changes_nothing() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed(
        &store,
        json!({
            "ibuprofen": {
                "zh": "布洛芬/依普芬",
                "en": "Ibuprofen",
                "alias": ["Advil", "brufen 400"]
            }
        }),
    );

    migrate_collection(&store, DEFAULT_COLLECTION).unwrap();
    let first = fs::read_to_string(store.collection_path(DEFAULT_COLLECTION)).unwrap();
    migrate_collection(&store, DEFAULT_COLLECTION).unwrap();
    let second = fs::read_to_string(store.collection_path(DEFAULT_COLLECTION)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn empty_collection_reports_zero() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    let report = migrate_collection(&store, DEFAULT_COLLECTION).unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(report.updated, 0);
}

#[test]
fn malformed_collection_is_fatal() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    fs::write(store.collection_path(DEFAULT_COLLECTION), "[not an object").unwrap();
    assert!(migrate_collection(&store, DEFAULT_COLLECTION).is_err());
}

/// Delegates to a [`JsonFileStore`] but refuses writes to one document.
struct RejectingStore {
    inner: JsonFileStore,
    reject_id: &'static str,
}

impl DocumentStore for RejectingStore {
    fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        self.inner.list(collection)
    }

    fn merge(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        if id == self.reject_id {
            return Err(StoreError::Io {
                path: self.inner.collection_path(collection),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "write rejected"),
            });
        }
        self.inner.merge(collection, id, fields)
    }
}

#[test]
fn failed_write_is_recorded_and_the_rest_still_migrate() {
    let dir = tempdir().unwrap();
    let store = RejectingStore {
        inner: JsonFileStore::new(dir.path()),
        reject_id: "bravo",
    };
    seed(
        &store.inner,
        json!({
            "alpha": {"zh": "阿斯匹靈", "en": " Aspirin "},
            "bravo": {"zh": "普拿疼", "en": " Panadol "},
            "charlie": {"zh": "布洛芬", "en": " Ibuprofen "}
        }),
    );

    let report = migrate_collection(&store, DEFAULT_COLLECTION).expect("run completes");
    assert_eq!(report.total, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(report.failed, vec!["bravo".to_string()]);

    let docs = store.list(DEFAULT_COLLECTION).unwrap();
    assert_eq!(field(&docs, "alpha", "en"), &json!("Aspirin"));
    assert_eq!(field(&docs, "charlie", "en"), &json!("Ibuprofen"));
    assert_eq!(field(&docs, "bravo", "en"), &json!(" Panadol "));
    let (_, bravo) = docs.iter().find(|(id, _)| id == "bravo").unwrap();
    assert!(bravo.get("keywords").is_none());
}
