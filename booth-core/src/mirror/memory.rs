//! In-memory relational mirror with failure injection

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::models::{AccountId, ProcessedPhotoRow};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use super::{EventUpsert, MirrorError, MirrorEventRow, MirrorResult, RelationalMirror};

#[derive(Clone, Default)]
pub struct MemoryMirror {
    events: Arc<DashMap<i64, MirrorEventRow>>,
    /// `(user_id, slug)` unique key
    event_keys: Arc<DashMap<(AccountId, String), i64>>,
    photos: Arc<DashMap<String, ProcessedPhotoRow>>,
    next_id: Arc<AtomicI64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, as when the pool cannot hand out a connection
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    pub fn event_by_key(&self, owner: AccountId, slug: &str) -> Option<MirrorEventRow> {
        let id = *self.event_keys.get(&(owner, slug.to_string()))?;
        self.events.get(&id).map(|r| r.clone())
    }

    /// Change moderation flags of a shadow row
    pub fn set_photo_flags(&self, share_code: &str, is_visible: bool, is_approved: bool) {
        if let Some(mut row) = self.photos.get_mut(share_code) {
            row.is_visible = is_visible;
            row.is_approved = is_approved;
        }
    }

    fn check_available(&self) -> MirrorResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MirrorError::Unavailable("pool timed out".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalMirror for MemoryMirror {
    async fn upsert_event(&self, row: &EventUpsert) -> MirrorResult<i64> {
        self.check_available()?;
        let now = Utc::now();
        let key = (row.user_id, row.slug.clone());

        let id = match self.event_keys.entry(key) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                e.insert(id);
                id
            }
        };

        let created_at = self.events.get(&id).map(|r| r.created_at).unwrap_or(now);
        self.events.insert(
            id,
            MirrorEventRow {
                id,
                user_id: row.user_id,
                slug: row.slug.clone(),
                title: row.title.clone(),
                description: row.description.clone(),
                start_date: row.start_date.clone(),
                end_date: row.end_date.clone(),
                is_active: row.is_active,
                theme: row.theme.clone(),
                templates: row.templates.clone(),
                branding: row.branding.clone(),
                settings: row.settings.clone(),
                created_at,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn find_event_id(&self, owner: AccountId, slug: &str) -> MirrorResult<Option<i64>> {
        self.check_available()?;
        Ok(self.event_keys.get(&(owner, slug.to_string())).map(|id| *id))
    }

    async fn get_event(&self, id: i64) -> MirrorResult<Option<MirrorEventRow>> {
        self.check_available()?;
        Ok(self.events.get(&id).map(|r| r.clone()))
    }

    async fn delete_event(&self, owner: AccountId, id: i64) -> MirrorResult<u64> {
        self.check_available()?;
        match self.events.remove_if(&id, |_, row| row.user_id == owner) {
            Some((_, row)) => {
                self.event_keys.remove(&(row.user_id, row.slug));
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_photo(&self, row: &ProcessedPhotoRow) -> MirrorResult<()> {
        self.check_available()?;
        self.photos
            .entry(row.share_code.clone())
            .or_insert_with(|| row.clone());
        Ok(())
    }

    async fn visible_photos(
        &self,
        event_id: i64,
        limit: i64,
        offset: i64,
    ) -> MirrorResult<Vec<ProcessedPhotoRow>> {
        self.check_available()?;
        let mut rows: Vec<ProcessedPhotoRow> = self
            .photos
            .iter()
            .filter(|r| r.event_id == Some(event_id) && r.is_visible && r.is_approved)
            .map(|r| r.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset.max(0)).unwrap_or(usize::MAX))
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .collect())
    }

    async fn delete_photo(&self, share_code: &str) -> MirrorResult<u64> {
        self.check_available()?;
        Ok(self.photos.remove(share_code).map_or(0, |_| 1))
    }
}
