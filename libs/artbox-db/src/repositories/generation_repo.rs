use anyhow::{Context, Result};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct GenerationRepository {
    pool: PgPool,
}

impl GenerationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one audit row. Write-once; there is no update path.
    pub async fn append(
        &self,
        bot_id: i64,
        user_id: i64,
        prompt: &str,
        result_url: Option<&str>,
        is_successful: bool,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO generations (bot_id, user_id, prompt, result_url, is_successful)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(bot_id)
        .bind(user_id)
        .bind(prompt)
        .bind(result_url)
        .bind(is_successful)
        .execute(&self.pool)
        .await
        .context("Failed to append generation record")?;
        Ok(())
    }
}
