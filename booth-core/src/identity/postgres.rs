use async_trait::async_trait;
use shared::models::{AccountId, AccountProvision, LegacyAccount, TransactionType, UuidAccount};
use sqlx::PgPool;

use super::{AccountDirectory, Provisioned};
use crate::error::{CoreError, CoreResult};

const LEGACY_COLUMNS: &str =
    "id, email, username, full_name, slug, tokens_remaining, is_active";

/// Account lookups over the `users` and `"user"` tables
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccountDirectory for PgAccountStore {
    async fn legacy_by_id(&self, id: AccountId) -> CoreResult<Option<LegacyAccount>> {
        let row = sqlx::query_as(&format!("SELECT {LEGACY_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn legacy_by_email(&self, email: &str) -> CoreResult<Option<LegacyAccount>> {
        let row = sqlx::query_as(&format!("SELECT {LEGACY_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn legacy_by_slug(&self, slug: &str) -> CoreResult<Option<LegacyAccount>> {
        let row = sqlx::query_as(&format!(
            "SELECT {LEGACY_COLUMNS} FROM users
             WHERE slug = $1 OR username = $1
             ORDER BY (slug = $1) DESC, id ASC
             LIMIT 1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn uuid_by_id(&self, id: &str) -> CoreResult<Option<UuidAccount>> {
        let row = sqlx::query_as(r#"SELECT id, email, name, slug FROM "user" WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn uuid_by_slug(&self, slug: &str) -> CoreResult<Option<UuidAccount>> {
        let row = sqlx::query_as(r#"SELECT id, email, name, slug FROM "user" WHERE slug = $1 LIMIT 1"#)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn slug_taken(&self, slug: &str) -> CoreResult<bool> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn provision_legacy(&self, provision: &AccountProvision) -> CoreResult<Provisioned> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<LegacyAccount> = sqlx::query_as(&format!(
            "INSERT INTO users (email, username, full_name, slug, tokens_remaining, is_active)
             VALUES ($1, $2, $3, $4, $5, TRUE)
             ON CONFLICT DO NOTHING
             RETURNING {LEGACY_COLUMNS}"
        ))
        .bind(&provision.email)
        .bind(&provision.username)
        .bind(&provision.full_name)
        .bind(&provision.slug)
        .bind(provision.initial_tokens)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(account) = inserted {
            sqlx::query(
                "INSERT INTO token_transactions (user_id, amount, transaction_type, description, balance_after)
                 VALUES ($1, $2, $3, $4, $2)",
            )
            .bind(account.id)
            .bind(provision.initial_tokens)
            .bind(TransactionType::InitialGrant.as_str())
            .bind("Initial token allotment")
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(Provisioned {
                account,
                created: true,
            });
        }
        tx.rollback().await?;

        // Lost the race on email, or the slug belongs to someone else
        match self.legacy_by_email(&provision.email).await? {
            Some(account) => Ok(Provisioned {
                account,
                created: false,
            }),
            None => Err(CoreError::Duplicate(format!("slug '{}'", provision.slug))),
        }
    }
}
