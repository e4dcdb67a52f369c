use async_trait::async_trait;
use shared::models::{AccountId, ChargeReceipt, LedgerStats, LedgerTransaction, TransactionType};
use std::sync::Arc;
use std::time::Duration;

use super::{LedgerEntry, LedgerStore};
use crate::error::{CoreError, CoreResult};
use crate::identity::MemoryAccountStore;

impl MemoryAccountStore {
    fn balance_lock(&self, account_id: AccountId) -> Arc<tokio::sync::Mutex<()>> {
        self.balance_locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryAccountStore {
    async fn custom_price(&self, account_id: AccountId, model_id: &str) -> CoreResult<Option<i64>> {
        Ok(self
            .custom_prices
            .get(&(account_id, model_id.to_string()))
            .map(|p| *p))
    }

    async fn global_price(&self, model_id: &str) -> CoreResult<Option<i64>> {
        Ok(self.global_prices.get(model_id).map(|p| *p))
    }

    async fn apply(&self, entry: &LedgerEntry, lock_timeout: Duration) -> CoreResult<ChargeReceipt> {
        let account_id = entry.account_id;
        if !self.legacy.contains_key(&account_id) {
            return Err(CoreError::account_not_found(account_id));
        }

        let lock = self.balance_lock(account_id);
        let _held = tokio::time::timeout(lock_timeout, lock.lock())
            .await
            .map_err(|_| CoreError::LockTimeout(account_id))?;

        let balance = self
            .legacy
            .get(&account_id)
            .map(|a| a.tokens_remaining)
            .ok_or_else(|| CoreError::account_not_found(account_id))?;

        // Suspension point between read and write, as a database round trip would be
        tokio::task::yield_now().await;

        let new_balance = entry.balance_after(balance)?;
        if let Some(mut account) = self.legacy.get_mut(&account_id) {
            account.tokens_remaining = new_balance;
        }
        let transaction_id = self.append_transaction(
            account_id,
            entry.delta,
            entry.transaction_type.as_str(),
            Some(entry.description.clone()),
            new_balance,
            entry.event_id,
            Some(entry.metadata.clone()),
        );

        Ok(ChargeReceipt {
            account_id,
            charged: entry.delta.abs(),
            new_balance,
            transaction_id,
        })
    }

    async fn balance(&self, account_id: AccountId) -> CoreResult<i64> {
        self.legacy
            .get(&account_id)
            .map(|a| a.tokens_remaining)
            .ok_or_else(|| CoreError::account_not_found(account_id))
    }

    async fn history(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<LedgerTransaction>> {
        let mut rows = self.transactions_of(account_id);
        rows.reverse();
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset.max(0)).unwrap_or(usize::MAX))
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .collect())
    }

    async fn stats(&self, account_id: AccountId) -> CoreResult<LedgerStats> {
        let balance = self.balance(account_id).await?;
        let mut stats = LedgerStats {
            balance,
            ..Default::default()
        };
        for t in self.transactions_of(account_id) {
            if t.transaction_type == TransactionType::Purchase.as_str() {
                stats.total_purchased += t.amount;
            } else if t.transaction_type == TransactionType::Generation.as_str() {
                stats.total_spent += t.amount.abs();
                stats.generation_count += 1;
            }
        }
        Ok(stats)
    }
}
