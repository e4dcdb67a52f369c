//! Relational Mirror
//!
//! Denormalized relational copies of events (`events`, unique per
//! `(user_id, slug)`) and photo shadow rows (`processed_photos`, unique per
//! `share_code`). The document store stays authoritative.

pub mod memory;
pub mod postgres;

pub use memory::MemoryMirror;
pub use postgres::PgMirror;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{AccountId, EventDocument, ProcessedPhotoRow};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Mirror unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type MirrorResult<T> = Result<T, MirrorError>;

/// Columns written by an event upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUpsert {
    pub user_id: AccountId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_active: bool,
    pub theme: Value,
    pub templates: Value,
    pub branding: Value,
    pub settings: Value,
}

impl EventUpsert {
    /// Mirror columns of a document owned by `owner`
    pub fn from_document(owner: AccountId, doc: &EventDocument) -> Self {
        Self {
            user_id: owner,
            slug: doc.slug.clone(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            start_date: doc.start_date.clone(),
            end_date: doc.end_date.clone(),
            is_active: doc.is_active,
            theme: json_or_empty(&doc.theme),
            templates: if doc.templates.is_null() {
                Value::Array(Vec::new())
            } else {
                doc.templates.clone()
            },
            branding: json_or_empty(&doc.branding),
            settings: json_or_empty(&doc.settings),
        }
    }
}

fn json_or_empty(v: &Value) -> Value {
    if v.is_null() {
        Value::Object(Default::default())
    } else {
        v.clone()
    }
}

/// Row of the relational `events` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MirrorEventRow {
    pub id: i64,
    pub user_id: AccountId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_active: bool,
    pub theme: Value,
    pub templates: Value,
    pub branding: Value,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RelationalMirror: Send + Sync {
    /// Insert or update the row for `(user_id, slug)`, returning its id
    async fn upsert_event(&self, row: &EventUpsert) -> MirrorResult<i64>;

    async fn find_event_id(&self, owner: AccountId, slug: &str) -> MirrorResult<Option<i64>>;

    async fn get_event(&self, id: i64) -> MirrorResult<Option<MirrorEventRow>>;

    /// Remove an owner's event row; returns rows deleted
    ///
    /// A row owned by another account is left alone and counts as zero.
    async fn delete_event(&self, owner: AccountId, id: i64) -> MirrorResult<u64>;

    /// Insert a photo shadow row; an existing share code is left untouched
    async fn insert_photo(&self, row: &ProcessedPhotoRow) -> MirrorResult<()>;

    /// Visible and approved shadow rows of an event, newest first
    async fn visible_photos(
        &self,
        event_id: i64,
        limit: i64,
        offset: i64,
    ) -> MirrorResult<Vec<ProcessedPhotoRow>>;

    async fn delete_photo(&self, share_code: &str) -> MirrorResult<u64>;
}
