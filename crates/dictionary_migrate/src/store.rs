use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::StoreError;

pub type Document = Map<String, Value>;

/// The slice of a document database the migration needs.
pub trait DocumentStore {
    fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError>;
    /// Overwrites the given top-level fields and keeps every other field.
    fn merge(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError>;
}

/// Stores each collection as `<root>/<collection>.json`, an object keyed by
/// document id.
///
/// Each `merge` reads and rewrites the whole collection file so that a failed
/// write only affects its own document. A full migration over `n` documents
/// therefore costs `O(n^2)` bytes of I/O, which is fine for a dictionary of a
/// few thousand entries run once; larger collections want a database backend.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    fn load(&self, collection: &str) -> Result<BTreeMap<String, Document>, StoreError> {
        let path = self.collection_path(collection);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::Malformed { path, source })
    }

    fn store(&self, collection: &str, docs: &BTreeMap<String, Document>) -> Result<(), StoreError> {
        let path = self.collection_path(collection);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;
        let encoded = serde_json::to_vec_pretty(docs).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, encoded).map_err(io_err)?;
        fs::rename(&staging, &path).map_err(io_err)
    }
}

impl DocumentStore for JsonFileStore {
    fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load(collection)?.into_iter().collect())
    }

    fn merge(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut docs = self.load(collection)?;
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| StoreError::MissingDocument {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (key, value) in fields {
            doc.insert(key, value);
        }
        self.store(collection, &docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn merge_keeps_untouched_fields() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::write(
            store.collection_path("drug_dictionary"),
            json!({"d1": {"en": " Aspirin ", "note": "keep me"}}).to_string(),
        )
        .unwrap();

        let mut fields = Document::new();
        fields.insert("en".into(), json!("Aspirin"));
        store.merge("drug_dictionary", "d1", fields).unwrap();

        let docs = store.list("drug_dictionary").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].1.get("en"), Some(&json!("Aspirin")));
        assert_eq!(docs[0].1.get("note"), Some(&json!("keep me")));
    }

    #[test]
    fn merge_into_unknown_document_fails() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.list("drug_dictionary").unwrap().is_empty());
        assert!(matches!(
            store.merge("drug_dictionary", "ghost", Document::new()),
            Err(StoreError::MissingDocument { .. })
        ));
    }
}
