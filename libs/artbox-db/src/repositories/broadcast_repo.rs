use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{Broadcast, BroadcastStatus};

/// A broadcast recipient: every user the bot has ever seen.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Recipient {
    pub user_id: i64,
    pub telegram_id: i64,
}

#[derive(Debug, Clone)]
pub struct BroadcastRepository {
    pool: PgPool,
}

impl BroadcastRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        bot_id: i64,
        message: &str,
        image_url: Option<&str>,
    ) -> Result<Broadcast> {
        sqlx::query_as::<_, Broadcast>(
            "INSERT INTO broadcasts (bot_id, message, image_url, status)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(bot_id)
        .bind(message)
        .bind(image_url)
        .bind(BroadcastStatus::PENDING)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create broadcast")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Broadcast>> {
        sqlx::query_as::<_, Broadcast>("SELECT * FROM broadcasts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch broadcast")
    }

    pub async fn set_status(&self, id: i64, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE broadcasts SET status = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await
        .context("Failed to update broadcast status")?;
        Ok(())
    }

    pub async fn set_total_users(&self, id: i64, total: i64) -> Result<()> {
        sqlx::query(
            "UPDATE broadcasts SET total_users = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(total)
        .execute(&self.pool)
        .await
        .context("Failed to update broadcast total")?;
        Ok(())
    }

    pub async fn save_progress(&self, id: i64, success: i64, fail: i64) -> Result<()> {
        sqlx::query(
            "UPDATE broadcasts
             SET success_count = $2, fail_count = $3, updated_at = CURRENT_TIMESTAMP
             WHERE id = $1",
        )
        .bind(id)
        .bind(success)
        .bind(fail)
        .execute(&self.pool)
        .await
        .context("Failed to save broadcast progress")?;
        Ok(())
    }

    /// Everyone with a balance row in this bot, with the Telegram chat id
    /// needed for delivery.
    pub async fn recipients(&self, bot_id: i64) -> Result<Vec<Recipient>> {
        sqlx::query_as::<_, Recipient>(
            "SELECT bu.user_id, u.telegram_id
             FROM bot_users bu
             JOIN users u ON u.id = bu.user_id
             WHERE bu.bot_id = $1
             ORDER BY bu.user_id",
        )
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch broadcast recipients")
    }
}
