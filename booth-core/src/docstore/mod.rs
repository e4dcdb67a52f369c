//! Document Store Adapter
//!
//! The canonical store for event and photo documents. One [`DocumentStore`]
//! handle addresses one database. Every mutation carries the revision it was
//! read at; a mismatch is a [`DocStoreError::Conflict`].

pub mod couch;
pub mod memory;
pub mod query;

pub use couch::CouchDocumentStore;
pub use memory::MemoryDocumentStore;
pub use query::{FindQuery, SortDirection, SortField};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Document store error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocStoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Id already taken on create, or stale `_rev` on update/delete
    #[error("Revision conflict on document {0}")]
    Conflict(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

pub type DocResult<T> = Result<T, DocStoreError>;

/// Id and revision assigned by a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocMeta {
    pub id: String,
    pub rev: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Database this handle writes to
    fn db_name(&self) -> &str;

    /// Insert a new document. An `_id` that already exists is a `Conflict`.
    async fn create_doc(&self, doc: Value) -> DocResult<DocMeta>;

    async fn get_doc(&self, id: &str) -> DocResult<Option<Value>>;

    /// Replace an existing document; `doc` must carry the `_rev` it was read at.
    async fn put_doc(&self, doc: Value) -> DocResult<DocMeta>;

    async fn delete_doc(&self, id: &str, rev: &str) -> DocResult<()>;

    /// Run a selector query. Failures are logged and yield an empty set.
    async fn query(&self, query: &FindQuery) -> Vec<Value>;

    /// Create a JSON index; an index that already exists is success.
    async fn ensure_index(&self, fields: &[&str], name: &str) -> DocResult<()>;
}

/// Read the `_id` of a document body
pub(crate) fn doc_id(doc: &Value) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}

/// Read the `_rev` of a document body
pub(crate) fn doc_rev(doc: &Value) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}
