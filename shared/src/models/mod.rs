//! Data models
//!
//! Shared between booth-core and the route layer.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! Legacy account ids are `i64`; document ids are strings.

pub mod account;
pub mod event;
pub mod ledger;
pub mod photo;

// Re-exports
pub use account::*;
pub use event::*;
pub use ledger::*;
pub use photo::*;
