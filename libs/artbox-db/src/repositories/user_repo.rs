use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::User;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by id")
    }

    pub async fn get_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by Telegram id")
    }

    /// Idempotent registration keyed by Telegram id. Name fields follow the
    /// freshest update; an existing value is kept when Telegram omits one.
    pub async fn upsert(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (telegram_id, username, full_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (telegram_id) DO UPDATE SET
                username = COALESCE(EXCLUDED.username, users.username),
                full_name = COALESCE(EXCLUDED.full_name, users.full_name),
                updated_at = CURRENT_TIMESTAMP
            RETURNING *
            "#,
        )
        .bind(telegram_id)
        .bind(username)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert user")
    }
}
