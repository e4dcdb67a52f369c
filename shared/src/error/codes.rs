//! Error codes of the booth platform

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code, serialized as its `u16` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Input rejected before any write
    ValidationFailed = 2,
    /// Resource already exists
    AlreadyExists = 4,

    // ==================== 1xxx: Identity ====================
    /// Caller carries no identity that maps to an account
    IdentityUnresolvable = 1010,

    // ==================== 2xxx: Permission ====================
    /// Caller does not own the resource
    NotResourceOwner = 2010,

    // ==================== 3xxx: Account ====================
    AccountNotFound = 3001,

    // ==================== 4xxx: Event ====================
    EventNotFound = 4001,
    /// Document was modified concurrently
    RevisionConflict = 4010,

    // ==================== 5xxx: Photo ====================
    PhotoNotFound = 5001,

    // ==================== 6xxx: Ledger ====================
    /// Balance lock could not be acquired in time
    LedgerBusy = 6001,

    // ==================== 9xxx: System ====================
    DatabaseError = 9002,
    /// Document store unavailable or rejected a write
    DocumentStoreError = 9010,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Whether a caller may retry the same request unchanged
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::IdentityUnresolvable | ErrorCode::RevisionConflict | ErrorCode::LedgerBusy
        )
    }

    /// Default English message
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::IdentityUnresolvable => "Caller identity could not be resolved",
            ErrorCode::NotResourceOwner => "Caller does not own this resource",
            ErrorCode::AccountNotFound => "Account not found",
            ErrorCode::EventNotFound => "Event not found",
            ErrorCode::RevisionConflict => "Document was modified concurrently",
            ErrorCode::PhotoNotFound => "Photo not found",
            ErrorCode::LedgerBusy => "Token balance is busy, please retry",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::DocumentStoreError => "Document store error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(ErrorCode::ValidationFailed),
            4 => Ok(ErrorCode::AlreadyExists),
            1010 => Ok(ErrorCode::IdentityUnresolvable),
            2010 => Ok(ErrorCode::NotResourceOwner),
            3001 => Ok(ErrorCode::AccountNotFound),
            4001 => Ok(ErrorCode::EventNotFound),
            4010 => Ok(ErrorCode::RevisionConflict),
            5001 => Ok(ErrorCode::PhotoNotFound),
            6001 => Ok(ErrorCode::LedgerBusy),
            9002 => Ok(ErrorCode::DatabaseError),
            9010 => Ok(ErrorCode::DocumentStoreError),
            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
