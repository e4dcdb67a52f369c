//! Application error

use super::codes::ErrorCode;
use http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Error with a code, a message and optional structured details
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Error with the code's default message
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Whether the caller may retry unchanged
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    // ==================== Convenience constructors ====================

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    pub fn already_exists(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::AlreadyExists, format!("{} already exists", r))
            .with_detail("resource", r)
    }

    pub fn not_owner(resource: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotResourceOwner).with_detail("resource", resource.into())
    }

    pub fn revision_conflict(doc_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::RevisionConflict).with_detail("doc_id", doc_id.into())
    }

    pub fn ledger_busy(account_id: i64) -> Self {
        Self::new(ErrorCode::LedgerBusy).with_detail("account_id", account_id)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::validation("Missing required fields")
            .with_detail("field", "slug")
            .with_detail("reason", "required");

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.to_string(), "Missing required fields");
        let details = err.details.unwrap();
        assert_eq!(details.get("field").unwrap(), "slug");
        assert_eq!(details.get("reason").unwrap(), "required");
    }

    #[test]
    fn test_constructors() {
        let err = AppError::ledger_busy(42);
        assert!(err.is_retryable());
        assert_eq!(err.details.as_ref().unwrap().get("account_id").unwrap(), 42);

        let err = AppError::not_owner("event:7:party");
        assert_eq!(err.http_status(), StatusCode::FORBIDDEN);

        let err = AppError::already_exists("event 'gala'");
        assert_eq!(err.message, "event 'gala' already exists");
    }
}
