//! HTTP status per error code

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::IdentityUnresolvable => StatusCode::UNAUTHORIZED,
            Self::NotResourceOwner => StatusCode::FORBIDDEN,
            Self::AccountNotFound | Self::EventNotFound | Self::PhotoNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::AlreadyExists | Self::RevisionConflict => StatusCode::CONFLICT,
            // Transient, the client can retry
            Self::LedgerBusy => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError | Self::DocumentStoreError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::EventNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::RevisionConflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::IdentityUnresolvable.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::LedgerBusy.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ErrorCode::DocumentStoreError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
