//! Identity Resolver
//!
//! Maps every way a caller can be referred to onto a legacy account id.
//! Account lookups go through [`AccountDirectory`] so the resolver runs the
//! same against PostgreSQL and the in-memory store.

pub mod memory;
pub mod postgres;
pub mod resolver;

pub use memory::MemoryAccountStore;
pub use postgres::PgAccountStore;
pub use resolver::{IdentityResolver, RESOLUTION_ORDER, ResolutionStep};

use async_trait::async_trait;
use shared::models::{AccountId, AccountProvision, LegacyAccount, UuidAccount};

use crate::error::CoreResult;

/// Outcome of a provisioning upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub account: LegacyAccount,
    /// False when another writer already held the email
    pub created: bool,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn legacy_by_id(&self, id: AccountId) -> CoreResult<Option<LegacyAccount>>;

    async fn legacy_by_email(&self, email: &str) -> CoreResult<Option<LegacyAccount>>;

    /// Legacy row whose slug or username equals `slug`
    async fn legacy_by_slug(&self, slug: &str) -> CoreResult<Option<LegacyAccount>>;

    async fn uuid_by_id(&self, id: &str) -> CoreResult<Option<UuidAccount>>;

    async fn uuid_by_slug(&self, slug: &str) -> CoreResult<Option<UuidAccount>>;

    async fn slug_taken(&self, slug: &str) -> CoreResult<bool>;

    /// Insert a legacy row keyed on email uniqueness
    ///
    /// Idempotent: when the email already exists the existing row is returned
    /// with `created = false`. A fresh row gets its initial allotment recorded
    /// as an `initial_grant` ledger transaction in the same write. A slug held
    /// by a different email yields `Duplicate`.
    async fn provision_legacy(&self, provision: &AccountProvision) -> CoreResult<Provisioned>;
}
