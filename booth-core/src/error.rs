//! Core error taxonomy
//!
//! `CoreError` is what every operation returns. Mirror failures never surface
//! here; they are reported next to the result as [`RecoverableSyncError`].

use shared::error::{AppError, ErrorCode};
use shared::models::AccountId;
use std::fmt;
use thiserror::Error;

use crate::docstore::DocStoreError;

/// Kind of resource a `NotFound` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Event,
    Photo,
    Account,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "Event"),
            Self::Photo => write!(f, "Photo"),
            Self::Account => write!(f, "Account"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    #[error("Account {caller} does not own {resource}")]
    OwnershipDenied { caller: AccountId, resource: String },

    #[error("Unresolvable caller: {0}")]
    Unresolvable(String),

    #[error("Stale revision on document {0}")]
    StaleRevision(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ledger lock timeout for account {0}")]
    LockTimeout(AccountId),

    #[error("Document store error: {0}")]
    DocumentStore(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    pub fn event_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: Resource::Event,
            id: id.into(),
        }
    }

    pub fn photo_not_found(share_code: impl Into<String>) -> Self {
        Self::NotFound {
            resource: Resource::Photo,
            id: share_code.into(),
        }
    }

    pub fn account_not_found(id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource: Resource::Account,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unresolvable(_) | Self::LockTimeout(_) | Self::StaleRevision(_)
        )
    }
}

impl From<DocStoreError> for CoreError {
    fn from(err: DocStoreError) -> Self {
        match err {
            DocStoreError::Conflict(id) => CoreError::StaleRevision(id),
            other => CoreError::DocumentStore(other.to_string()),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { resource, id } => {
                let code = match resource {
                    Resource::Event => ErrorCode::EventNotFound,
                    Resource::Photo => ErrorCode::PhotoNotFound,
                    Resource::Account => ErrorCode::AccountNotFound,
                };
                AppError::new(code).with_detail("id", id)
            }
            CoreError::OwnershipDenied { resource, .. } => AppError::not_owner(resource),
            CoreError::Unresolvable(_) => AppError::new(ErrorCode::IdentityUnresolvable),
            CoreError::StaleRevision(id) => AppError::revision_conflict(id),
            CoreError::Duplicate(what) => AppError::already_exists(what),
            CoreError::Validation(msg) => AppError::validation(msg),
            CoreError::LockTimeout(account_id) => AppError::ledger_busy(account_id),
            CoreError::DocumentStore(msg) => {
                tracing::error!(error = %msg, "Document store error");
                AppError::new(ErrorCode::DocumentStoreError)
            }
            CoreError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Dual-write reporting
// =============================================================================

/// Which mirror write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// Event row upsert
    Upsert,
    /// Writing the assigned mirror id back onto the document
    Backfill,
    /// Event row delete
    Delete,
    /// Photo shadow row insert or delete
    PhotoShadow,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Upsert => "upsert",
            Self::Backfill => "backfill",
            Self::Delete => "delete",
            Self::PhotoShadow => "photo_shadow",
        };
        f.write_str(s)
    }
}

/// Mirror-side failure after the authoritative document write succeeded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoverableSyncError {
    #[error("mirror sync failed during {stage} for {doc_id}: {reason}")]
    MirrorSyncFailed {
        stage: SyncStage,
        doc_id: String,
        reason: String,
    },
}

impl RecoverableSyncError {
    pub fn mirror(stage: SyncStage, doc_id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::MirrorSyncFailed {
            stage,
            doc_id: doc_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn stage(&self) -> SyncStage {
        match self {
            Self::MirrorSyncFailed { stage, .. } => *stage,
        }
    }
}

/// What the mirror side of a dual write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorWrite {
    /// Event row upserted; `backfilled` when the document got its mirror id
    Upserted { mirror_id: i64, backfilled: bool },
    /// Rows removed from the mirror
    Deleted { rows: u64 },
    /// Photo shadow row written
    ShadowWritten,
    /// Nothing to do on the mirror side
    Skipped,
}

/// Result of a mutating dual-write operation
#[derive(Debug, Clone)]
pub struct SyncReport<T> {
    pub value: T,
    pub mirror: Result<MirrorWrite, RecoverableSyncError>,
}

impl<T> SyncReport<T> {
    pub fn new(value: T, mirror: Result<MirrorWrite, RecoverableSyncError>) -> Self {
        Self { value, mirror }
    }

    /// True when the mirror write did not fail
    pub fn is_consistent(&self) -> bool {
        self.mirror.is_ok()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
