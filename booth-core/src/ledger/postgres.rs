use async_trait::async_trait;
use shared::models::{AccountId, ChargeReceipt, LedgerStats, LedgerTransaction};
use sqlx::PgPool;
use std::time::Duration;

use super::{LedgerEntry, LedgerStore};
use crate::error::{CoreError, CoreResult};

/// SQLSTATE `lock_not_available`
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn lock_error(err: sqlx::Error, account_id: AccountId) -> CoreError {
    let timed_out = match &err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(LOCK_NOT_AVAILABLE),
        _ => false,
    };
    if timed_out {
        CoreError::LockTimeout(account_id)
    } else {
        CoreError::Database(err)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn custom_price(&self, account_id: AccountId, model_id: &str) -> CoreResult<Option<i64>> {
        let cost = sqlx::query_scalar(
            "SELECT token_cost::BIGINT FROM custom_user_pricing
             WHERE user_id = $1 AND model_id = $2 AND is_active = TRUE",
        )
        .bind(account_id)
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cost)
    }

    async fn global_price(&self, model_id: &str) -> CoreResult<Option<i64>> {
        let cost = sqlx::query_scalar(
            "SELECT cost_per_generation::BIGINT FROM ai_generation_costs
             WHERE model_name = $1 AND is_active = TRUE",
        )
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cost)
    }

    async fn apply(&self, entry: &LedgerEntry, lock_timeout: Duration) -> CoreResult<ChargeReceipt> {
        let account_id = entry.account_id;
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        let balance: Option<i64> =
            sqlx::query_scalar("SELECT tokens_remaining FROM users WHERE id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| lock_error(e, account_id))?;
        let Some(balance) = balance else {
            return Err(CoreError::account_not_found(account_id));
        };

        let new_balance = entry.balance_after(balance)?;
        sqlx::query("UPDATE users SET tokens_remaining = $1, updated_at = NOW() WHERE id = $2")
            .bind(new_balance)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let transaction_id: i64 = sqlx::query_scalar(
            "INSERT INTO token_transactions
                (user_id, amount, transaction_type, description, balance_after, event_id, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(account_id)
        .bind(entry.delta)
        .bind(entry.transaction_type.as_str())
        .bind(&entry.description)
        .bind(new_balance)
        .bind(entry.event_id)
        .bind(&entry.metadata)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChargeReceipt {
            account_id,
            charged: entry.delta.abs(),
            new_balance,
            transaction_id,
        })
    }

    async fn balance(&self, account_id: AccountId) -> CoreResult<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT tokens_remaining FROM users WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;
        balance.ok_or_else(|| CoreError::account_not_found(account_id))
    }

    async fn history(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<LedgerTransaction>> {
        let rows = sqlx::query_as(
            "SELECT id, user_id, amount, transaction_type, description, balance_after,
                    event_id, metadata, created_at
             FROM token_transactions
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stats(&self, account_id: AccountId) -> CoreResult<LedgerStats> {
        let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT u.tokens_remaining,
                    COALESCE(SUM(tt.amount) FILTER (WHERE tt.transaction_type = 'purchase'), 0)::BIGINT,
                    COALESCE(SUM(ABS(tt.amount)) FILTER (WHERE tt.transaction_type = 'generation'), 0)::BIGINT,
                    COUNT(tt.id) FILTER (WHERE tt.transaction_type = 'generation')
             FROM users u
             LEFT JOIN token_transactions tt ON tt.user_id = u.id
             WHERE u.id = $1
             GROUP BY u.id, u.tokens_remaining",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        let (balance, total_purchased, total_spent, generation_count) =
            row.ok_or_else(|| CoreError::account_not_found(account_id))?;
        Ok(LedgerStats {
            balance,
            total_purchased,
            total_spent,
            generation_count,
        })
    }
}
