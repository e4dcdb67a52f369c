//! Photo dual writes
//!
//! Photo documents are authoritative; `processed_photos` holds shadow rows
//! keyed on the share code for relational consumers.

use serde_json::Value;
use shared::models::{
    CallerRef, FeedPhoto, PHOTO_DOC_TYPE, PhotoCreate, PhotoDocument, ProcessedPhotoRow,
};
use shared::util::{generate_photo_id, generate_share_code, now_millis};
use std::collections::HashMap;

use super::DualWriteSynchronizer;
use crate::error::{CoreError, CoreResult, MirrorWrite, SyncReport, SyncStage};

/// Share codes drawn before giving up
const MAX_SHARE_CODE_ATTEMPTS: usize = 5;

impl DualWriteSynchronizer {
    pub async fn create_photo(
        &self,
        caller: &CallerRef,
        input: PhotoCreate,
    ) -> CoreResult<SyncReport<PhotoDocument>> {
        let caller_id = self.resolver.resolve(caller).await?;
        let event = self
            .events
            .find_by_id(&input.event_id)
            .await?
            .ok_or_else(|| CoreError::event_not_found(&input.event_id))?;
        let owner = self.ensure_owner_field(caller_id, &event.user_id, &event.id).await?;

        let event_mirror_ref = match event.mirror_ref {
            Some(id) => Some(id),
            None => self.lookup_mirror_id(owner, &event.slug).await,
        };

        let mut created = None;
        for attempt in 1..=MAX_SHARE_CODE_ATTEMPTS {
            let share_code = generate_share_code();
            if self.photos.share_code_exists(&share_code).await? {
                tracing::debug!(share_code = %share_code, attempt, "Share code collision");
                continue;
            }

            let doc = PhotoDocument {
                id: generate_photo_id(),
                rev: None,
                doc_type: PHOTO_DOC_TYPE.to_string(),
                share_code,
                event_id: Some(event.id.clone()),
                event_slug: Some(event.slug.clone()),
                event_mirror_ref,
                user_id: owner.to_string(),
                user_slug: event.user_slug.clone(),
                original_image_url: input.original_image_url.clone(),
                processed_image_url: input.processed_image_url.clone(),
                background_name: input.background_name.clone(),
                meta: input.meta.clone(),
                created_at: now_millis(),
                extra: Default::default(),
            };
            match self.photos.create(&doc).await {
                Ok(doc) => {
                    created = Some(doc);
                    break;
                }
                Err(CoreError::Duplicate(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        let Some(photo) = created else {
            return Err(CoreError::Duplicate(format!(
                "no free share code after {MAX_SHARE_CODE_ATTEMPTS} attempts"
            )));
        };

        tracing::info!(
            account_id = owner,
            event_id = %event.id,
            share_code = %photo.share_code,
            "Photo created"
        );

        let mirror = match event_mirror_ref {
            None => {
                tracing::debug!(event_id = %event.id, "Event has no mirror row, skipping shadow row");
                Ok(MirrorWrite::Skipped)
            }
            Some(mirror_event_id) => {
                let row = shadow_row(&photo, owner, mirror_event_id);
                match self.mirror.insert_photo(&row).await {
                    Ok(()) => Ok(MirrorWrite::ShadowWritten),
                    Err(e) => Err(self.mirror_failed(SyncStage::PhotoShadow, &photo.id, e)),
                }
            }
        };
        Ok(SyncReport::new(photo, mirror))
    }

    pub async fn get_photo_by_share_code(&self, share_code: &str) -> CoreResult<PhotoDocument> {
        self.photos
            .find_by_share_code(share_code)
            .await?
            .ok_or_else(|| CoreError::photo_not_found(share_code))
    }

    /// Feed of an event: document photos and mirror shadow rows merged by
    /// share code, newest first
    pub async fn list_event_photos(
        &self,
        event_doc_id: &str,
        limit: usize,
        offset: usize,
    ) -> CoreResult<Vec<FeedPhoto>> {
        let event = self
            .events
            .find_by_id(event_doc_id)
            .await?
            .ok_or_else(|| CoreError::event_not_found(event_doc_id))?;
        let window = limit.saturating_add(offset);
        let mirror_window = i64::try_from(window).unwrap_or(i64::MAX);

        let docs = self.photos.list_by_event(&event.id, window, 0).await?;
        let rows = match event.mirror_ref {
            Some(mirror_id) => match self
                .mirror
                .visible_photos(mirror_id, mirror_window, 0)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(event_id = %event.id, error = %e, "Shadow rows unavailable, serving documents only");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(merge_feed(&docs, &rows, limit, offset))
    }

    pub async fn delete_photo(
        &self,
        caller: &CallerRef,
        share_code: &str,
    ) -> CoreResult<SyncReport<PhotoDocument>> {
        let caller_id = self.resolver.resolve(caller).await?;
        let photo = self.get_photo_by_share_code(share_code).await?;
        let owner = self
            .ensure_owner_field(caller_id, &photo.user_id, &photo.share_code)
            .await?;

        self.photos.delete(&photo).await?;
        tracing::info!(account_id = owner, share_code = %share_code, "Photo deleted");

        let mirror = match self.mirror.delete_photo(share_code).await {
            Ok(rows) => Ok(MirrorWrite::Deleted { rows }),
            Err(e) => Err(self.mirror_failed(SyncStage::PhotoShadow, &photo.id, e)),
        };
        Ok(SyncReport::new(photo, mirror))
    }
}

fn shadow_row(photo: &PhotoDocument, owner: i64, mirror_event_id: i64) -> ProcessedPhotoRow {
    ProcessedPhotoRow {
        id: photo.id.clone(),
        share_code: photo.share_code.clone(),
        user_id: Some(owner),
        event_id: Some(mirror_event_id),
        original_image_url: photo.original_image_url.clone(),
        processed_image_url: photo.processed_image_url.clone(),
        background_name: photo
            .background_name
            .clone()
            .or_else(|| photo.meta.get("background").and_then(Value::as_str).map(str::to_string)),
        is_visible: true,
        is_approved: true,
        created_at: photo.created_at,
    }
}

/// Union by share code (documents win), newest first, then the page
pub fn merge_feed(
    docs: &[PhotoDocument],
    rows: &[ProcessedPhotoRow],
    limit: usize,
    offset: usize,
) -> Vec<FeedPhoto> {
    let mut by_code: HashMap<&str, FeedPhoto> = HashMap::new();
    for row in rows {
        by_code.insert(row.share_code.as_str(), FeedPhoto::from(row));
    }
    for doc in docs {
        by_code.insert(doc.share_code.as_str(), FeedPhoto::from(doc));
    }

    let mut feed: Vec<FeedPhoto> = by_code.into_values().collect();
    feed.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.share_code.cmp(&b.share_code))
    });
    feed.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use shared::models::PhotoSource;

    fn doc(code: &str, created_at: i64) -> PhotoDocument {
        PhotoDocument {
            id: format!("photo_{code}"),
            rev: None,
            doc_type: PHOTO_DOC_TYPE.to_string(),
            share_code: code.to_string(),
            event_id: Some("event:1:gala".to_string()),
            event_slug: Some("gala".to_string()),
            event_mirror_ref: Some(1),
            user_id: "1".to_string(),
            user_slug: None,
            original_image_url: None,
            processed_image_url: None,
            background_name: None,
            meta: Value::Null,
            created_at,
            extra: Map::new(),
        }
    }

    fn row(code: &str, created_at: i64) -> ProcessedPhotoRow {
        shadow_row(&doc(code, created_at), 1, 1)
    }

    #[test]
    fn test_merge_feed_dedupes_and_orders() {
        let docs = vec![doc("AAAAAA", 30), doc("BBBBBB", 10)];
        let rows = vec![row("BBBBBB", 10), row("CCCCCC", 20)];

        let feed = merge_feed(&docs, &rows, 10, 0);
        let codes: Vec<_> = feed.iter().map(|p| p.share_code.as_str()).collect();
        assert_eq!(codes, vec!["AAAAAA", "CCCCCC", "BBBBBB"]);
        assert_eq!(feed[2].source, PhotoSource::Document);
        assert_eq!(feed[1].source, PhotoSource::Mirror);
    }

    #[test]
    fn test_merge_feed_pages() {
        let docs: Vec<_> = (0..5).map(|i| doc(&format!("CODE0{i}"), i)).collect();
        let feed = merge_feed(&docs, &[], 2, 1);
        let codes: Vec<_> = feed.iter().map(|p| p.share_code.as_str()).collect();
        assert_eq!(codes, vec!["CODE03", "CODE02"]);
    }

    #[test]
    fn test_shadow_row_background_from_meta() {
        let mut photo = doc("AAAAAA", 1);
        photo.meta = serde_json::json!({ "background": "beach" });
        assert_eq!(shadow_row(&photo, 1, 2).background_name.as_deref(), Some("beach"));
        assert_eq!(shadow_row(&photo, 1, 2).event_id, Some(2));
    }
}
