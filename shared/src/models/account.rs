//! Account Model
//!
//! Two account schemes coexist: the legacy integer-keyed `users` table (the
//! only one the ledger references) and the UUID-keyed `"user"` table written
//! by the external auth service. They are linked only by email equality.

use serde::{Deserialize, Serialize};

/// Legacy account id (`users.id`)
pub type AccountId = i64;

/// Legacy account row (`users`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct LegacyAccount {
    pub id: AccountId,
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub slug: Option<String>,
    pub tokens_remaining: i64,
    pub is_active: bool,
}

/// UUID account row (`"user"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct UuidAccount {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// Values copied into a synthesized legacy account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProvision {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub slug: String,
    pub initial_tokens: i64,
}

/// Ambiguous reference to a caller or resource owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallerRef {
    /// Legacy integer id
    Legacy(AccountId),
    /// Externally issued string id
    Uuid(String),
    /// Event document id; the caller is the event's owner
    Event(String),
    /// Slug or username
    Slug(String),
    /// No identity information at all
    Anonymous,
}

impl CallerRef {
    /// Interpret an owner field as stored on documents
    ///
    /// All-digit values are legacy ids, anything else non-empty is a UUID id.
    pub fn from_owner_field(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::Anonymous;
        }
        match raw.parse::<AccountId>() {
            Ok(id) if raw.bytes().all(|b| b.is_ascii_digit()) => Self::Legacy(id),
            _ => Self::Uuid(raw.to_string()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl std::fmt::Display for CallerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy(id) => write!(f, "legacy:{}", id),
            Self::Uuid(id) => write!(f, "uuid:{}", id),
            Self::Event(id) => write!(f, "event:{}", id),
            Self::Slug(slug) => write!(f, "slug:{}", slug),
            Self::Anonymous => write!(f, "anonymous"),
        }
    }
}
