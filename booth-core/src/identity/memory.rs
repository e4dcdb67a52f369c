//! In-memory account store
//!
//! Holds both account tables and the token ledger so that provisioning and
//! charging share one source of truth, as they share `users` in PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use shared::models::{
    AccountId, AccountProvision, LedgerTransaction, LegacyAccount, TransactionType, UuidAccount,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{AccountDirectory, Provisioned};
use crate::error::{CoreError, CoreResult};

#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    pub(crate) legacy: Arc<DashMap<AccountId, LegacyAccount>>,
    pub(crate) uuid: Arc<DashMap<String, UuidAccount>>,
    /// Serializes the unique-key checks of inserts
    insert_guard: Arc<Mutex<()>>,
    pub(crate) transactions: Arc<Mutex<Vec<LedgerTransaction>>>,
    /// One async lock per account, standing in for the balance row lock
    pub(crate) balance_locks: Arc<DashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
    pub(crate) custom_prices: Arc<DashMap<(AccountId, String), i64>>,
    pub(crate) global_prices: Arc<DashMap<String, i64>>,
    next_account_id: Arc<AtomicI64>,
    next_transaction_id: Arc<AtomicI64>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a legacy account whose balance comes from an `initial_grant` row
    pub fn seed_legacy(&self, email: &str, slug: &str, balance: i64) -> CoreResult<LegacyAccount> {
        let provision = AccountProvision {
            email: email.to_string(),
            username: slug.to_string(),
            full_name: None,
            slug: slug.to_string(),
            initial_tokens: balance,
        };
        self.insert_legacy(&provision).map(|p| p.account)
    }

    /// Add a row to the UUID account table
    pub fn seed_uuid(&self, id: &str, email: Option<&str>, name: Option<&str>, slug: Option<&str>) {
        self.uuid.insert(
            id.to_string(),
            UuidAccount {
                id: id.to_string(),
                email: email.map(str::to_string),
                name: name.map(str::to_string),
                slug: slug.map(str::to_string),
            },
        );
    }

    pub fn set_custom_price(&self, account_id: AccountId, model_id: &str, tokens: i64) {
        self.custom_prices
            .insert((account_id, model_id.to_string()), tokens);
    }

    pub fn set_global_price(&self, model_id: &str, tokens: i64) {
        self.global_prices.insert(model_id.to_string(), tokens);
    }

    pub fn legacy_count(&self) -> usize {
        self.legacy.len()
    }

    /// Every ledger row of an account in insertion order
    pub fn transactions_of(&self, account_id: AccountId) -> Vec<LedgerTransaction> {
        self.transactions
            .lock()
            .iter()
            .filter(|t| t.user_id == account_id)
            .cloned()
            .collect()
    }

    fn find_legacy(&self, pred: impl Fn(&LegacyAccount) -> bool) -> Option<LegacyAccount> {
        self.legacy
            .iter()
            .find(|e| pred(e.value()))
            .map(|e| e.value().clone())
    }

    fn insert_legacy(&self, provision: &AccountProvision) -> CoreResult<Provisioned> {
        let _guard = self.insert_guard.lock();

        if let Some(account) = self.find_legacy(|a| a.email == provision.email) {
            return Ok(Provisioned {
                account,
                created: false,
            });
        }
        if self
            .find_legacy(|a| a.slug.as_deref() == Some(provision.slug.as_str()))
            .is_some()
        {
            return Err(CoreError::Duplicate(format!("slug '{}'", provision.slug)));
        }

        let id = self.next_account_id.fetch_add(1, Ordering::SeqCst) + 1;
        let account = LegacyAccount {
            id,
            email: provision.email.clone(),
            username: Some(provision.username.clone()),
            full_name: provision.full_name.clone(),
            slug: Some(provision.slug.clone()),
            tokens_remaining: provision.initial_tokens,
            is_active: true,
        };
        self.legacy.insert(id, account.clone());
        self.append_transaction(
            id,
            provision.initial_tokens,
            TransactionType::InitialGrant.as_str(),
            Some("Initial token allotment".to_string()),
            provision.initial_tokens,
            None,
            None,
        );
        Ok(Provisioned {
            account,
            created: true,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn append_transaction(
        &self,
        user_id: AccountId,
        amount: i64,
        transaction_type: &str,
        description: Option<String>,
        balance_after: i64,
        event_id: Option<i64>,
        metadata: Option<Value>,
    ) -> i64 {
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.transactions.lock().push(LedgerTransaction {
            id,
            user_id,
            amount,
            transaction_type: transaction_type.to_string(),
            description,
            balance_after,
            event_id,
            metadata,
            created_at: Utc::now(),
        });
        id
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountStore {
    async fn legacy_by_id(&self, id: AccountId) -> CoreResult<Option<LegacyAccount>> {
        Ok(self.legacy.get(&id).map(|a| a.clone()))
    }

    async fn legacy_by_email(&self, email: &str) -> CoreResult<Option<LegacyAccount>> {
        Ok(self.find_legacy(|a| a.email == email))
    }

    async fn legacy_by_slug(&self, slug: &str) -> CoreResult<Option<LegacyAccount>> {
        if let Some(account) = self.find_legacy(|a| a.slug.as_deref() == Some(slug)) {
            return Ok(Some(account));
        }
        Ok(self.find_legacy(|a| a.username.as_deref() == Some(slug)))
    }

    async fn uuid_by_id(&self, id: &str) -> CoreResult<Option<UuidAccount>> {
        Ok(self.uuid.get(id).map(|u| u.clone()))
    }

    async fn uuid_by_slug(&self, slug: &str) -> CoreResult<Option<UuidAccount>> {
        Ok(self
            .uuid
            .iter()
            .find(|u| u.slug.as_deref() == Some(slug))
            .map(|u| u.value().clone()))
    }

    async fn slug_taken(&self, slug: &str) -> CoreResult<bool> {
        Ok(self
            .find_legacy(|a| a.slug.as_deref() == Some(slug))
            .is_some())
    }

    async fn provision_legacy(&self, provision: &AccountProvision) -> CoreResult<Provisioned> {
        // Let concurrent provisioners interleave before the insert
        tokio::task::yield_now().await;
        self.insert_legacy(provision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provision(email: &str, slug: &str) -> AccountProvision {
        AccountProvision {
            email: email.to_string(),
            username: slug.to_string(),
            full_name: None,
            slug: slug.to_string(),
            initial_tokens: 1000,
        }
    }

    #[tokio::test]
    async fn test_provision_is_idempotent_on_email() {
        let store = MemoryAccountStore::new();
        let first = store
            .provision_legacy(&provision("ana@example.com", "ana"))
            .await
            .unwrap();
        let second = store
            .provision_legacy(&provision("ana@example.com", "ana-2"))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.account.id, second.account.id);
        assert_eq!(store.legacy_count(), 1);
        assert_eq!(store.transactions_of(first.account.id).len(), 1);
    }

    #[tokio::test]
    async fn test_provision_rejects_slug_of_other_email() {
        let store = MemoryAccountStore::new();
        store.seed_legacy("ana@example.com", "ana", 10).unwrap();
        let err = store
            .provision_legacy(&provision("other@example.com", "ana"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_slug_lookup_falls_back_to_username() {
        let store = MemoryAccountStore::new();
        let seeded = store.seed_legacy("ana@example.com", "ana", 10).unwrap();
        if let Some(mut a) = store.legacy.get_mut(&seeded.id) {
            a.username = Some("anasilva".to_string());
        }
        assert_eq!(
            store.legacy_by_slug("anasilva").await.unwrap().map(|a| a.id),
            Some(seeded.id)
        );
    }
}
