//! Event Model
//!
//! Event documents live in the document store; the relational `events` table
//! holds a denormalized mirror keyed by `(user_id, slug)`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document `type` discriminator for events
pub const EVENT_DOC_TYPE: &str = "event";

/// Fields a patch can never change
pub const PROTECTED_EVENT_FIELDS: &[&str] = &["_id", "_rev", "type", "user_id", "slug", "created_at"];

/// Field name of the mirror cross-reference inside event documents
pub const MIRROR_REF_FIELD: &str = "postgres_event_id";

/// Fields only the core writes: the mirror id it was assigned and the
/// owner data copied from the resolved account
pub const DERIVED_EVENT_FIELDS: &[&str] = &[
    MIRROR_REF_FIELD,
    "user_slug",
    "username",
    "user_full_name",
    "updated_at",
];

/// Whether a client-supplied key may be stored on an event document
pub fn is_client_writable(key: &str) -> bool {
    !PROTECTED_EVENT_FIELDS.contains(&key) && !DERIVED_EVENT_FIELDS.contains(&key)
}

fn event_doc_type() -> String {
    EVENT_DOC_TYPE.to_string()
}

fn default_true() -> bool {
    true
}

/// Canonical event document
///
/// Unknown fields written by older clients are kept in `extra` and survive a
/// read/merge/write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type", default = "event_doc_type")]
    pub doc_type: String,
    /// Owner id in string form (legacy integer or UUID account id)
    pub user_id: String,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub theme: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub templates: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub branding: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
    /// Relational mirror id; set once, never reassigned
    #[serde(rename = "postgres_event_id", default, skip_serializing_if = "Option::is_none")]
    pub mirror_ref: Option<i64>,
    /// Owner slug, denormalized for the public fallback lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_full_name: Option<String>,
    /// RFC 3339
    #[serde(default)]
    pub created_at: String,
    /// RFC 3339
    #[serde(default)]
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventDocument {
    /// Deterministic document id for an owner's slug
    ///
    /// Two concurrent creates for the same `(owner, slug)` collide on this id,
    /// so the document store rejects the second one.
    pub fn doc_id_for(owner_id: &str, slug: &str) -> String {
        format!("event:{}:{}", owner_id, slug)
    }
}

/// Create event payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventCreate {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub theme: Value,
    #[serde(default)]
    pub templates: Value,
    #[serde(default)]
    pub branding: Value,
    #[serde(default)]
    pub settings: Value,
    /// Extra fields stored as-is on the document
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Update event payload: a shallow JSON patch
///
/// Present keys replace the stored value, absent keys keep it.
pub type EventPatch = Map<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_document_wire_names() {
        let raw = json!({
            "_id": "event:42:gala",
            "_rev": "3-abc",
            "type": "event",
            "user_id": "42",
            "slug": "gala",
            "title": "Gala",
            "postgres_event_id": 7,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z",
            "legacy_color": "teal"
        });

        let doc: EventDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.id, "event:42:gala");
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
        assert_eq!(doc.mirror_ref, Some(7));
        assert!(doc.is_active);
        assert_eq!(doc.extra.get("legacy_color").unwrap(), "teal");

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["postgres_event_id"], 7);
        assert_eq!(back["legacy_color"], "teal");
        assert!(back.get("theme").is_none());
    }

    #[test]
    fn test_client_writable_fields() {
        assert!(is_client_writable("title"));
        assert!(is_client_writable("kiosk_mode"));
        for key in ["_id", "user_id", "slug", "postgres_event_id", "user_slug", "username"] {
            assert!(!is_client_writable(key), "{key} must not be client writable");
        }
    }

    #[test]
    fn test_doc_id_for() {
        assert_eq!(EventDocument::doc_id_for("42", "gala"), "event:42:gala");
    }
}
