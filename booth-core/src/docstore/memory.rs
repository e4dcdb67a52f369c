//! In-memory document store
//!
//! CouchDB-like semantics (revision tokens, create conflicts, `_find` subset)
//! for tests and local development, with failure injection.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::query::{matches, sort_docs};
use super::{DocMeta, DocResult, DocStoreError, DocumentStore, FindQuery, doc_id, doc_rev};

#[derive(Debug, Clone)]
struct StoredDoc {
    generation: u64,
    body: Value,
}

impl StoredDoc {
    fn rev(&self) -> String {
        format!("{}-{}", self.generation, rev_suffix(&self.body))
    }
}

/// Deterministic per-content suffix, like CouchDB's digest revisions
fn rev_suffix(body: &Value) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    body.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    conflicts: AtomicUsize,
}

/// In-memory [`DocumentStore`] for one database
#[derive(Clone)]
pub struct MemoryDocumentStore {
    name: String,
    docs: Arc<DashMap<String, StoredDoc>>,
    indexes: Arc<DashMap<String, Vec<String>>>,
    faults: Arc<Faults>,
}

impl MemoryDocumentStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Arc::new(DashMap::new()),
            indexes: Arc::new(DashMap::new()),
            faults: Arc::new(Faults::default()),
        }
    }

    /// Make every call fail as if the server were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` `put_doc` calls with a revision conflict
    pub fn inject_conflicts(&self, n: usize) {
        self.faults.conflicts.store(n, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.iter().map(|e| e.key().clone()).collect()
    }

    fn check_available(&self) -> DocResult<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(DocStoreError::Unavailable(format!(
                "{} is not reachable",
                self.name
            )));
        }
        Ok(())
    }

    fn take_injected_conflict(&self) -> bool {
        self.faults
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn with_meta(mut body: Value, id: &str, rev: &str) -> Value {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("_id".into(), Value::from(id));
            obj.insert("_rev".into(), Value::from(rev));
        }
        body
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn db_name(&self) -> &str {
        &self.name
    }

    async fn create_doc(&self, mut doc: Value) -> DocResult<DocMeta> {
        self.check_available()?;
        let Some(obj) = doc.as_object_mut() else {
            return Err(DocStoreError::Malformed("document must be an object".into()));
        };
        obj.remove("_rev");
        let id = match obj.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                obj.insert("_id".into(), Value::from(id.clone()));
                id
            }
        };

        match self.docs.entry(id.clone()) {
            Entry::Occupied(_) => Err(DocStoreError::Conflict(id)),
            Entry::Vacant(slot) => {
                let stored = StoredDoc {
                    generation: 1,
                    body: doc,
                };
                let rev = stored.rev();
                slot.insert(stored);
                Ok(DocMeta { id, rev })
            }
        }
    }

    async fn get_doc(&self, id: &str) -> DocResult<Option<Value>> {
        self.check_available()?;
        Ok(self
            .docs
            .get(id)
            .map(|d| Self::with_meta(d.body.clone(), id, &d.rev())))
    }

    async fn put_doc(&self, mut doc: Value) -> DocResult<DocMeta> {
        self.check_available()?;
        let id = doc_id(&doc)
            .ok_or_else(|| DocStoreError::Malformed("missing _id".into()))?
            .to_string();
        let rev = doc_rev(&doc).map(str::to_string);

        if self.take_injected_conflict() {
            return Err(DocStoreError::Conflict(id));
        }

        if let Some(obj) = doc.as_object_mut() {
            obj.remove("_rev");
        }

        match self.docs.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                if rev.as_deref() != Some(slot.get().rev().as_str()) {
                    return Err(DocStoreError::Conflict(id));
                }
                let next = StoredDoc {
                    generation: slot.get().generation + 1,
                    body: doc,
                };
                let rev = next.rev();
                slot.insert(next);
                Ok(DocMeta { id, rev })
            }
            Entry::Vacant(slot) => {
                // CouchDB accepts a PUT without _rev as a create
                if rev.is_some() {
                    return Err(DocStoreError::Conflict(id));
                }
                let stored = StoredDoc {
                    generation: 1,
                    body: doc,
                };
                let rev = stored.rev();
                slot.insert(stored);
                Ok(DocMeta { id, rev })
            }
        }
    }

    async fn delete_doc(&self, id: &str, rev: &str) -> DocResult<()> {
        self.check_available()?;
        match self.docs.entry(id.to_string()) {
            Entry::Vacant(_) => Err(DocStoreError::NotFound(id.to_string())),
            Entry::Occupied(slot) => {
                if slot.get().rev() != rev {
                    return Err(DocStoreError::Conflict(id.to_string()));
                }
                slot.remove();
                Ok(())
            }
        }
    }

    async fn query(&self, query: &FindQuery) -> Vec<Value> {
        if let Err(e) = self.check_available() {
            tracing::warn!(db = %self.name, error = %e, "Document query failed");
            return Vec::new();
        }

        let mut hits = Vec::new();
        for entry in self.docs.iter() {
            let doc = Self::with_meta(entry.body.clone(), entry.key(), &entry.rev());
            match matches(&doc, &query.selector) {
                Ok(true) => hits.push(doc),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(db = %self.name, error = %e, "Document query failed");
                    return Vec::new();
                }
            }
        }

        sort_docs(&mut hits, &query.sort);
        hits.into_iter()
            .skip(query.skip)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect()
    }

    async fn ensure_index(&self, fields: &[&str], name: &str) -> DocResult<()> {
        self.check_available()?;
        self.indexes
            .entry(name.to_string())
            .or_insert_with(|| fields.iter().map(|f| f.to_string()).collect());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::SortField;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_get_put_delete() {
        let store = MemoryDocumentStore::new("events");

        let meta = store
            .create_doc(json!({"_id": "a", "type": "event", "n": 1}))
            .await
            .unwrap();
        assert!(meta.rev.starts_with("1-"));

        let doc = store.get_doc("a").await.unwrap().unwrap();
        assert_eq!(doc["_rev"], meta.rev.as_str());

        let mut updated = doc.clone();
        updated["n"] = json!(2);
        let meta2 = store.put_doc(updated).await.unwrap();
        assert!(meta2.rev.starts_with("2-"));

        // Writing again at the old revision is stale
        let mut stale = doc;
        stale["n"] = json!(3);
        assert_eq!(
            store.put_doc(stale).await,
            Err(DocStoreError::Conflict("a".into()))
        );

        assert_eq!(
            store.delete_doc("a", &meta.rev).await,
            Err(DocStoreError::Conflict("a".into()))
        );
        store.delete_doc("a", &meta2.rev).await.unwrap();
        assert!(store.get_doc("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_conflict_on_existing_id() {
        let store = MemoryDocumentStore::new("events");
        store.create_doc(json!({"_id": "a"})).await.unwrap();
        assert_eq!(
            store.create_doc(json!({"_id": "a"})).await,
            Err(DocStoreError::Conflict("a".into()))
        );
    }

    #[tokio::test]
    async fn test_query_filters_sorts_and_pages() {
        let store = MemoryDocumentStore::new("photos");
        for i in 0..5 {
            store
                .create_doc(json!({"_id": format!("p{i}"), "type": "photo", "event_id": "e1", "created_at": i}))
                .await
                .unwrap();
        }
        store
            .create_doc(json!({"_id": "other", "type": "photo", "event_id": "e2", "created_at": 99}))
            .await
            .unwrap();

        let q = FindQuery::new(json!({"type": "photo", "event_id": "e1"}))
            .sort(SortField::desc("created_at"))
            .skip(1)
            .limit(2);
        let docs = store.query(&q).await;
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["p3", "p2"]);
    }

    #[tokio::test]
    async fn test_query_degrades_to_empty() {
        let store = MemoryDocumentStore::new("events");
        store.create_doc(json!({"_id": "a", "slug": "x"})).await.unwrap();

        let bad = FindQuery::new(json!({"slug": {"$regex": "x"}}));
        assert!(store.query(&bad).await.is_empty());

        store.set_unavailable(true);
        assert!(store.query(&FindQuery::new(json!({}))).await.is_empty());
        assert!(matches!(
            store.get_doc("a").await,
            Err(DocStoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_index_idempotent() {
        let store = MemoryDocumentStore::new("events");
        store.ensure_index(&["type", "user_id"], "idx_events_user").await.unwrap();
        store.ensure_index(&["type", "user_id"], "idx_events_user").await.unwrap();
        assert_eq!(store.index_names(), vec!["idx_events_user".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MemoryDocumentStore::new("events");
        store.create_doc(json!({"_id": "a"})).await.unwrap();
        store.inject_conflicts(1);

        let doc = store.get_doc("a").await.unwrap().unwrap();
        assert!(store.put_doc(doc.clone()).await.is_err());
        assert!(store.put_doc(doc).await.is_ok());
    }
}
