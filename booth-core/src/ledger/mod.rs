//! Token Ledger
//!
//! Every balance change is one atomic step: lock the account's balance,
//! apply a signed delta, append a transaction row carrying the resulting
//! balance. Charges for the same account serialize on that lock.

pub mod memory;
pub mod postgres;
pub mod pricing;

pub use postgres::PgLedgerStore;
pub use pricing::{
    BUILTIN_MODEL_COSTS, DEFAULT_TOKEN_COST, PRICE_RESOLUTION_ORDER, Price, PriceSource,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use shared::models::{
    AccountId, CallerRef, ChargeReceipt, CreditReason, LedgerStats, LedgerTransaction,
    TransactionType,
};
use std::sync::Arc;
use std::time::Duration;

use crate::audit_log;
use crate::error::{CoreError, CoreResult};
use crate::identity::IdentityResolver;

/// One balance mutation
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub account_id: AccountId,
    /// Signed: charges are negative
    pub delta: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    pub event_id: Option<i64>,
    pub metadata: Value,
}

impl LedgerEntry {
    /// Balance after applying this entry; rejects a result outside `i64`
    pub fn balance_after(&self, balance: i64) -> CoreResult<i64> {
        balance.checked_add(self.delta).ok_or_else(|| {
            CoreError::Validation(format!(
                "balance {balance} for account {} cannot absorb {}",
                self.account_id, self.delta
            ))
        })
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Active per-account price for a model
    async fn custom_price(&self, account_id: AccountId, model_id: &str)
    -> CoreResult<Option<i64>>;

    /// Active global price for a model
    async fn global_price(&self, model_id: &str) -> CoreResult<Option<i64>>;

    /// Lock the balance, apply the delta, append the transaction
    ///
    /// Waiting for the lock longer than `lock_timeout` fails with
    /// `LockTimeout`; an unknown account fails with `NotFound`.
    async fn apply(&self, entry: &LedgerEntry, lock_timeout: Duration)
    -> CoreResult<ChargeReceipt>;

    async fn balance(&self, account_id: AccountId) -> CoreResult<i64>;

    /// Transactions newest first
    async fn history(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<LedgerTransaction>>;

    async fn stats(&self, account_id: AccountId) -> CoreResult<LedgerStats>;
}

#[derive(Clone)]
pub struct TokenLedger {
    store: Arc<dyn LedgerStore>,
    resolver: IdentityResolver,
    lock_timeout: Duration,
}

impl TokenLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        resolver: IdentityResolver,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            lock_timeout,
        }
    }

    /// Cost of one generation, walking [`PRICE_RESOLUTION_ORDER`]
    pub async fn price(
        &self,
        account_id: AccountId,
        model_id: &str,
        explicit: Option<i64>,
    ) -> CoreResult<Price> {
        for source in PRICE_RESOLUTION_ORDER {
            let tokens = match source {
                PriceSource::Explicit => explicit,
                PriceSource::AccountCustom => self.store.custom_price(account_id, model_id).await?,
                PriceSource::GlobalDefault => self.store.global_price(model_id).await?,
                PriceSource::BuiltinTable => pricing::builtin_cost(model_id),
                PriceSource::ConstantDefault => Some(DEFAULT_TOKEN_COST),
            };
            if let Some(tokens) = tokens {
                return Ok(Price {
                    tokens,
                    source: *source,
                });
            }
        }
        Ok(Price {
            tokens: DEFAULT_TOKEN_COST,
            source: PriceSource::ConstantDefault,
        })
    }

    /// Charge one generation. The balance may go negative.
    pub async fn charge(
        &self,
        account_id: AccountId,
        model_id: &str,
        explicit: Option<i64>,
    ) -> CoreResult<ChargeReceipt> {
        self.charge_with_event(account_id, model_id, explicit, None)
            .await
    }

    pub async fn charge_with_event(
        &self,
        account_id: AccountId,
        model_id: &str,
        explicit: Option<i64>,
        event_id: Option<i64>,
    ) -> CoreResult<ChargeReceipt> {
        if let Some(tokens) = explicit.filter(|t| *t < 0) {
            return Err(CoreError::Validation(format!(
                "explicit token cost must not be negative, got {tokens}"
            )));
        }

        let price = self.price(account_id, model_id, explicit).await?;
        if price.tokens < 0 {
            return Err(CoreError::Validation(format!(
                "{} price for {model_id} is negative: {}",
                price.source.as_str(),
                price.tokens
            )));
        }
        let entry = LedgerEntry {
            account_id,
            delta: -price.tokens,
            transaction_type: TransactionType::Generation,
            description: format!("AI generation: {model_id}"),
            event_id,
            metadata: json!({
                "model_id": model_id,
                "price_source": price.source.as_str(),
            }),
        };
        let receipt = self.store.apply(&entry, self.lock_timeout).await?;

        tracing::info!(
            account_id,
            model_id,
            charged = receipt.charged,
            new_balance = receipt.new_balance,
            price_source = price.source.as_str(),
            "Tokens charged"
        );
        audit_log!(
            account_id,
            "charge",
            format!("model:{model_id}"),
            format!("charged {}, balance {}", receipt.charged, receipt.new_balance)
        );
        Ok(receipt)
    }

    /// Credit tokens
    pub async fn add(
        &self,
        account_id: AccountId,
        amount: i64,
        reason: CreditReason,
    ) -> CoreResult<ChargeReceipt> {
        if amount <= 0 {
            return Err(CoreError::Validation(format!(
                "credit amount must be positive, got {amount}"
            )));
        }

        let transaction_type = reason.transaction_type();
        let entry = LedgerEntry {
            account_id,
            delta: amount,
            transaction_type,
            description: reason.description(amount),
            event_id: None,
            metadata: reason.metadata(),
        };
        let receipt = self.store.apply(&entry, self.lock_timeout).await?;

        tracing::info!(
            account_id,
            amount,
            kind = transaction_type.as_str(),
            new_balance = receipt.new_balance,
            "Tokens credited"
        );
        audit_log!(
            account_id,
            "credit",
            transaction_type.as_str(),
            format!("added {}, balance {}", amount, receipt.new_balance)
        );
        Ok(receipt)
    }

    pub async fn charge_caller(
        &self,
        caller: &CallerRef,
        model_id: &str,
        explicit: Option<i64>,
    ) -> CoreResult<ChargeReceipt> {
        let account_id = self.resolver.resolve(caller).await?;
        self.charge(account_id, model_id, explicit).await
    }

    pub async fn add_for_caller(
        &self,
        caller: &CallerRef,
        amount: i64,
        reason: CreditReason,
    ) -> CoreResult<ChargeReceipt> {
        let account_id = self.resolver.resolve(caller).await?;
        self.add(account_id, amount, reason).await
    }

    pub async fn balance(&self, account_id: AccountId) -> CoreResult<i64> {
        self.store.balance(account_id).await
    }

    pub async fn history(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<LedgerTransaction>> {
        self.store
            .history(account_id, limit.max(0), offset.max(0))
            .await
    }

    pub async fn stats(&self, account_id: AccountId) -> CoreResult<LedgerStats> {
        self.store.stats(account_id).await
    }
}
