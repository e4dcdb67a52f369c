//! Photo Model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document `type` discriminator for photos
pub const PHOTO_DOC_TYPE: &str = "photo";

fn photo_doc_type() -> String {
    PHOTO_DOC_TYPE.to_string()
}

/// Canonical photo document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type", default = "photo_doc_type")]
    pub doc_type: String,
    /// Immutable, globally unique, 6 upper-case hex chars
    pub share_code: String,
    /// Owning event document id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_slug: Option<String>,
    /// Owning event's relational mirror id
    #[serde(rename = "postgres_event_id", default, skip_serializing_if = "Option::is_none")]
    pub event_mirror_ref: Option<i64>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_name: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
    /// Epoch millis
    pub created_at: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Create photo payload (image URLs come from object storage)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhotoCreate {
    /// Owning event document id
    pub event_id: String,
    pub original_image_url: Option<String>,
    pub processed_image_url: Option<String>,
    pub background_name: Option<String>,
    #[serde(default)]
    pub meta: Value,
}

/// Relational shadow row of a photo (`processed_photos`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ProcessedPhotoRow {
    pub id: String,
    pub share_code: String,
    pub user_id: Option<i64>,
    pub event_id: Option<i64>,
    pub original_image_url: Option<String>,
    pub processed_image_url: Option<String>,
    pub background_name: Option<String>,
    pub is_visible: bool,
    pub is_approved: bool,
    /// Epoch millis
    pub created_at: i64,
}

/// Where a feed entry was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoSource {
    Document,
    Mirror,
}

/// One entry of an event's photo feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPhoto {
    pub share_code: String,
    pub original_image_url: Option<String>,
    pub processed_image_url: Option<String>,
    pub background_name: Option<String>,
    pub created_at: i64,
    pub source: PhotoSource,
}

impl From<&PhotoDocument> for FeedPhoto {
    fn from(doc: &PhotoDocument) -> Self {
        Self {
            share_code: doc.share_code.clone(),
            original_image_url: doc.original_image_url.clone(),
            processed_image_url: doc.processed_image_url.clone(),
            background_name: doc.background_name.clone(),
            created_at: doc.created_at,
            source: PhotoSource::Document,
        }
    }
}

impl From<&ProcessedPhotoRow> for FeedPhoto {
    fn from(row: &ProcessedPhotoRow) -> Self {
        Self {
            share_code: row.share_code.clone(),
            original_image_url: row.original_image_url.clone(),
            processed_image_url: row.processed_image_url.clone(),
            background_name: row.background_name.clone(),
            created_at: row.created_at,
            source: PhotoSource::Mirror,
        }
    }
}
