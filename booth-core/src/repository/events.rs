//! Event Repository

use serde_json::json;
use shared::models::{EVENT_DOC_TYPE, EventDocument};
use std::collections::HashMap;
use std::sync::Arc;

use super::{BaseRepository, IndexSpec};
use crate::docstore::{DocumentStore, FindQuery, SortField};
use crate::error::{CoreError, CoreResult};

/// Indexes the event database needs
pub const EVENT_INDEXES: &[IndexSpec] = &[
    (&["type", "user_id"], "idx_events_user"),
    (&["type", "user_id", "slug"], "idx_events_user_slug"),
    (&["type", "created_at"], "idx_events_created"),
    (&["type", "user_id", "slug", "updated_at"], "idx_events_user_slug_updated"),
    (&["type", "postgres_event_id"], "idx_events_postgres_id"),
    (&["type", "user_slug", "slug"], "idx_events_owner_slug"),
];

/// Candidates read for one `(owner, slug)`; the newest wins
const SLUG_LOOKUP_LIMIT: usize = 5;

#[derive(Clone)]
pub struct EventRepository {
    base: BaseRepository,
}

impl EventRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            base: BaseRepository::new(store),
        }
    }

    pub async fn ensure_indexes(&self) -> CoreResult<()> {
        self.base.ensure_indexes(EVENT_INDEXES).await
    }

    /// Create a new event document, returning it with its revision
    pub async fn create(&self, doc: &EventDocument) -> CoreResult<EventDocument> {
        let mut body = self.base.encode(doc)?;
        if let Some(obj) = body.as_object_mut() {
            obj.remove("_rev");
        }
        let what = format!("event '{}' for owner {}", doc.slug, doc.user_id);
        let meta = self.base.create_value(body, &what).await?;
        let mut created = doc.clone();
        created.id = meta.id;
        created.rev = Some(meta.rev);
        Ok(created)
    }

    pub async fn find_by_id(&self, id: &str) -> CoreResult<Option<EventDocument>> {
        match self.base.store().get_doc(id).await? {
            Some(doc) => self.base.decode(doc).map(Some),
            None => Ok(None),
        }
    }

    /// Write a modified document at the revision it carries
    pub async fn update(&self, doc: &EventDocument) -> CoreResult<EventDocument> {
        let body = self.base.encode(doc)?;
        let meta = self.base.store().put_doc(body).await?;
        let mut saved = doc.clone();
        saved.rev = Some(meta.rev);
        Ok(saved)
    }

    pub async fn delete(&self, doc: &EventDocument) -> CoreResult<()> {
        let rev = doc
            .rev
            .as_deref()
            .ok_or_else(|| CoreError::StaleRevision(doc.id.clone()))?;
        self.base.store().delete_doc(&doc.id, rev).await?;
        Ok(())
    }

    /// Most recently updated event of an owner with this slug
    pub async fn find_by_owner_slug(
        &self,
        owner_id: &str,
        slug: &str,
    ) -> CoreResult<Option<EventDocument>> {
        let query = FindQuery::new(json!({
            "type": EVENT_DOC_TYPE,
            "user_id": owner_id,
            "slug": slug,
        }))
        .sort(SortField::desc("updated_at"))
        .limit(SLUG_LOOKUP_LIMIT);
        Ok(self.first(query).await)
    }

    /// Lookup on the denormalized owner slug (`user_slug`)
    pub async fn find_by_owner_slug_field(
        &self,
        owner_slug: &str,
        slug: &str,
    ) -> CoreResult<Option<EventDocument>> {
        let query = FindQuery::new(json!({
            "type": EVENT_DOC_TYPE,
            "user_slug": owner_slug,
            "slug": slug,
        }))
        .sort(SortField::desc("updated_at"))
        .limit(SLUG_LOOKUP_LIMIT);
        Ok(self.first(query).await)
    }

    pub async fn find_by_mirror_ref(&self, mirror_id: i64) -> CoreResult<Option<EventDocument>> {
        let query = FindQuery::new(json!({
            "type": EVENT_DOC_TYPE,
            "postgres_event_id": mirror_id,
        }))
        .limit(1);
        Ok(self.first(query).await)
    }

    /// All events of an owner: one per slug (latest update wins), newest created first
    pub async fn list_by_owner(&self, owner_id: &str) -> CoreResult<Vec<EventDocument>> {
        let query = FindQuery::new(json!({
            "type": EVENT_DOC_TYPE,
            "user_id": owner_id,
        }));
        let docs: Vec<EventDocument> = self.base.decode_all(self.base.store().query(&query).await);
        Ok(dedupe_by_slug(docs))
    }

    /// One page of all events ordered by creation time
    pub async fn page_by_created(&self, skip: usize, limit: usize) -> Vec<EventDocument> {
        let query = FindQuery::new(json!({ "type": EVENT_DOC_TYPE }))
            .sort(SortField::asc("created_at"))
            .skip(skip)
            .limit(limit);
        self.base.decode_all(self.base.store().query(&query).await)
    }

    async fn first(&self, query: FindQuery) -> Option<EventDocument> {
        let docs = self.base.store().query(&query).await;
        self.base.decode_all(docs).into_iter().next()
    }
}

/// Keep the most recently updated document per slug, newest created first
pub fn dedupe_by_slug(docs: Vec<EventDocument>) -> Vec<EventDocument> {
    let mut latest: HashMap<String, EventDocument> = HashMap::new();
    for doc in docs {
        match latest.get(&doc.slug) {
            Some(kept) if kept.updated_at >= doc.updated_at => {}
            _ => {
                latest.insert(doc.slug.clone(), doc);
            }
        }
    }
    let mut events: Vec<EventDocument> = latest.into_values().collect();
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    events
}
