use async_trait::async_trait;
use shared::models::{AccountId, ProcessedPhotoRow};
use sqlx::PgPool;

use super::{EventUpsert, MirrorEventRow, MirrorResult, RelationalMirror};

/// PostgreSQL mirror
#[derive(Clone)]
pub struct PgMirror {
    pool: PgPool,
}

impl PgMirror {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationalMirror for PgMirror {
    async fn upsert_event(&self, row: &EventUpsert) -> MirrorResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO events (user_id, slug, title, description, start_date, end_date,
                                 is_active, theme, templates, branding, settings)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (user_id, slug) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                is_active = EXCLUDED.is_active,
                theme = EXCLUDED.theme,
                templates = EXCLUDED.templates,
                branding = EXCLUDED.branding,
                settings = EXCLUDED.settings,
                updated_at = NOW()
             RETURNING id",
        )
        .bind(row.user_id)
        .bind(&row.slug)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.start_date)
        .bind(&row.end_date)
        .bind(row.is_active)
        .bind(&row.theme)
        .bind(&row.templates)
        .bind(&row.branding)
        .bind(&row.settings)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_event_id(&self, owner: AccountId, slug: &str) -> MirrorResult<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM events WHERE user_id = $1 AND slug = $2")
            .bind(owner)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_event(&self, id: i64) -> MirrorResult<Option<MirrorEventRow>> {
        let row = sqlx::query_as(
            "SELECT id, user_id, slug, title, description, start_date, end_date, is_active,
                    theme, templates, branding, settings, created_at, updated_at
             FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_event(&self, owner: AccountId, id: i64) -> MirrorResult<u64> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_photo(&self, row: &ProcessedPhotoRow) -> MirrorResult<()> {
        sqlx::query(
            "INSERT INTO processed_photos (id, share_code, user_id, event_id, original_image_url,
                                           processed_image_url, background_name, is_visible,
                                           is_approved, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (share_code) DO NOTHING",
        )
        .bind(&row.id)
        .bind(&row.share_code)
        .bind(row.user_id)
        .bind(row.event_id)
        .bind(&row.original_image_url)
        .bind(&row.processed_image_url)
        .bind(&row.background_name)
        .bind(row.is_visible)
        .bind(row.is_approved)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn visible_photos(
        &self,
        event_id: i64,
        limit: i64,
        offset: i64,
    ) -> MirrorResult<Vec<ProcessedPhotoRow>> {
        let rows = sqlx::query_as(
            "SELECT id, share_code, user_id, event_id, original_image_url, processed_image_url,
                    background_name, is_visible, is_approved, created_at
             FROM processed_photos
             WHERE event_id = $1 AND is_visible = TRUE AND is_approved = TRUE
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(event_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_photo(&self, share_code: &str) -> MirrorResult<u64> {
        let result = sqlx::query("DELETE FROM processed_photos WHERE share_code = $1")
            .bind(share_code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
