//! Error surface handed to the route layer
//!
//! - [`ErrorCode`]: numeric code per failure kind, with its HTTP status
//! - [`AppError`]: code, message and optional details
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Identity errors
//! - 2xxx: Permission errors
//! - 3xxx: Account errors
//! - 4xxx: Event errors
//! - 5xxx: Photo errors
//! - 6xxx: Token ledger errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::validation("Slug must not be empty").with_detail("field", "slug");
//! assert_eq!(err.code, ErrorCode::ValidationFailed);
//! assert_eq!(err.http_status(), shared::http::StatusCode::BAD_REQUEST);
//! ```

mod codes;
mod http;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
