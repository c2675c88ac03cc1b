//! One-shot normalization of the drug dictionary collection: cleans the
//! localized name list, the latin name and the alias list of every document
//! and derives the keyword-prefix index used for typeahead search.

pub mod credentials;
pub mod error;
pub mod normalize;
pub mod store;

use tracing::{error, info, instrument};

use crate::error::StoreError;
use crate::normalize::normalize;
use crate::store::DocumentStore;

pub const DEFAULT_COLLECTION: &str = "drug_dictionary";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub total: usize,
    pub updated: usize,
    pub failed: Vec<String>,
}

/// Normalizes every document in `collection`.
///
/// Reading the collection is fatal; a failed write of a single document is
/// logged and the run moves on to the next one.
#[instrument(skip(store))]
pub fn migrate_collection(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<MigrationReport, StoreError> {
    info!("fetching documents");
    let documents = store.list(collection)?;
    let total = documents.len();
    info!(total, "found documents");

    let mut report = MigrationReport {
        total,
        ..MigrationReport::default()
    };
    for (index, (id, document)) in documents.into_iter().enumerate() {
        let fields = normalize(&document).into_fields();
        match store.merge(collection, &id, fields) {
            Ok(()) => {
                report.updated += 1;
                info!("{}/{} updated: {}", index + 1, total, id);
            }
            Err(err) => {
                error!(%err, "failed to update {}", id);
                report.failed.push(id);
            }
        }
    }
    Ok(report)
}
