//! Shared types for the booth platform
//!
//! Domain models (event and photo documents, account identities, ledger
//! transactions) and the unified error surface used by the route layer.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCode};
