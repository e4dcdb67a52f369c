//! Photo Repository

use serde_json::json;
use shared::models::{PHOTO_DOC_TYPE, PhotoDocument};
use std::sync::Arc;

use super::{BaseRepository, IndexSpec};
use crate::docstore::{DocumentStore, FindQuery, SortField};
use crate::error::{CoreError, CoreResult};

/// Indexes the photo database needs
pub const PHOTO_INDEXES: &[IndexSpec] = &[
    (&["type", "event_id"], "idx_photos_event"),
    (&["type", "event_slug"], "idx_photos_event_slug"),
    (&["type", "share_code"], "idx_photos_share"),
    (&["type", "event_id", "created_at"], "idx_photos_event_created"),
];

#[derive(Clone)]
pub struct PhotoRepository {
    base: BaseRepository,
}

impl PhotoRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            base: BaseRepository::new(store),
        }
    }

    pub async fn ensure_indexes(&self) -> CoreResult<()> {
        self.base.ensure_indexes(PHOTO_INDEXES).await
    }

    pub async fn create(&self, doc: &PhotoDocument) -> CoreResult<PhotoDocument> {
        let mut body = self.base.encode(doc)?;
        if let Some(obj) = body.as_object_mut() {
            obj.remove("_rev");
        }
        let what = format!("photo '{}'", doc.id);
        let meta = self.base.create_value(body, &what).await?;
        let mut created = doc.clone();
        created.id = meta.id;
        created.rev = Some(meta.rev);
        Ok(created)
    }

    pub async fn find_by_share_code(&self, share_code: &str) -> CoreResult<Option<PhotoDocument>> {
        let query = FindQuery::new(json!({
            "type": PHOTO_DOC_TYPE,
            "share_code": share_code,
        }))
        .limit(1);
        let docs = self.base.store().query(&query).await;
        Ok(self.base.decode_all(docs).into_iter().next())
    }

    pub async fn share_code_exists(&self, share_code: &str) -> CoreResult<bool> {
        Ok(self.find_by_share_code(share_code).await?.is_some())
    }

    /// Photos of one event document, newest first
    pub async fn list_by_event(
        &self,
        event_doc_id: &str,
        limit: usize,
        offset: usize,
    ) -> CoreResult<Vec<PhotoDocument>> {
        let query = FindQuery::new(json!({
            "type": PHOTO_DOC_TYPE,
            "event_id": event_doc_id,
        }))
        .sort(SortField::desc("created_at"))
        .skip(offset)
        .limit(limit);
        let docs = self.base.store().query(&query).await;
        Ok(self.base.decode_all(docs))
    }

    pub async fn delete(&self, doc: &PhotoDocument) -> CoreResult<()> {
        let rev = doc
            .rev
            .as_deref()
            .ok_or_else(|| CoreError::StaleRevision(doc.id.clone()))?;
        self.base.store().delete_doc(&doc.id, rev).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryDocumentStore;
    use serde_json::{Map, Value};

    fn photo(id: &str, code: &str, created_at: i64) -> PhotoDocument {
        PhotoDocument {
            id: id.to_string(),
            rev: None,
            doc_type: PHOTO_DOC_TYPE.to_string(),
            share_code: code.to_string(),
            event_id: Some("event:7:gala".to_string()),
            event_slug: Some("gala".to_string()),
            event_mirror_ref: Some(3),
            user_id: "7".to_string(),
            user_slug: None,
            original_image_url: None,
            processed_image_url: Some(format!("https://cdn/{code}.jpg")),
            background_name: None,
            meta: Value::Null,
            created_at,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_share_code_lookup_and_event_listing() {
        let repo = PhotoRepository::new(Arc::new(MemoryDocumentStore::new("photos")));
        repo.create(&photo("p1", "AAAAAA", 1)).await.unwrap();
        repo.create(&photo("p2", "BBBBBB", 2)).await.unwrap();
        repo.create(&photo("p3", "CCCCCC", 3)).await.unwrap();

        assert!(repo.share_code_exists("BBBBBB").await.unwrap());
        assert!(!repo.share_code_exists("DDDDDD").await.unwrap());

        let page = repo.list_by_event("event:7:gala", 2, 0).await.unwrap();
        let codes: Vec<_> = page.iter().map(|p| p.share_code.as_str()).collect();
        assert_eq!(codes, vec!["CCCCCC", "BBBBBB"]);

        let found = repo.find_by_share_code("AAAAAA").await.unwrap().unwrap();
        repo.delete(&found).await.unwrap();
        assert!(repo.find_by_share_code("AAAAAA").await.unwrap().is_none());
    }
}
