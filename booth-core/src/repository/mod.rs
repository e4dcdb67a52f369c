//! Repository Module
//!
//! Typed access to event and photo documents on top of a [`DocumentStore`].

pub mod events;
pub mod photos;

pub use events::EventRepository;
pub use photos::PhotoRepository;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::docstore::{DocMeta, DocumentStore};
use crate::error::{CoreError, CoreResult};

/// `(fields, name)` of a JSON index
pub type IndexSpec = (&'static [&'static str], &'static str);

/// Base repository with document store reference
#[derive(Clone)]
pub struct BaseRepository {
    store: Arc<dyn DocumentStore>,
}

impl BaseRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn decode<T: DeserializeOwned>(&self, doc: Value) -> CoreResult<T> {
        serde_json::from_value(doc).map_err(|e| {
            CoreError::DocumentStore(format!("malformed document in {}: {}", self.store.db_name(), e))
        })
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> CoreResult<Value> {
        serde_json::to_value(value)
            .map_err(|e| CoreError::DocumentStore(format!("cannot encode document: {}", e)))
    }

    /// Decode query results, skipping documents that do not fit the model
    pub fn decode_all<T: DeserializeOwned>(&self, docs: Vec<Value>) -> Vec<T> {
        docs.into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(db = %self.store.db_name(), error = %e, "Skipping malformed document");
                    None
                }
            })
            .collect()
    }

    pub async fn ensure_indexes(&self, indexes: &[IndexSpec]) -> CoreResult<()> {
        for (fields, name) in indexes {
            self.store.ensure_index(fields, name).await?;
        }
        Ok(())
    }

    /// Create a new document; an id that already exists is a `Duplicate`
    pub async fn create_value(&self, doc: Value, what: &str) -> CoreResult<DocMeta> {
        use crate::docstore::DocStoreError;
        self.store.create_doc(doc).await.map_err(|e| match e {
            DocStoreError::Conflict(_) => CoreError::Duplicate(what.to_string()),
            other => other.into(),
        })
    }
}
