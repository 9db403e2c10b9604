use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{AiModel, BotConfig};

/// Read-mostly lookup of bot rows. Bot rows are mutated only through the
/// admin path; webhook processing never writes them.
#[derive(Debug, Clone)]
pub struct BotRepository {
    pool: PgPool,
}

impl BotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve an inbound webhook token to an active bot. Inactive and
    /// unknown tokens both come back as None; the caller acknowledges the
    /// webhook either way.
    pub async fn resolve_active(&self, token: &str) -> Result<Option<BotConfig>> {
        sqlx::query_as::<_, BotConfig>(
            "SELECT * FROM bots WHERE token = $1 AND is_active = TRUE",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to resolve bot by token")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<BotConfig>> {
        sqlx::query_as::<_, BotConfig>("SELECT * FROM bots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch bot by id")
    }

    /// The bot's selected model, if one is configured and still active.
    pub async fn get_ai_model(&self, bot: &BotConfig) -> Result<Option<AiModel>> {
        let Some(model_id) = bot.ai_model_id else {
            return Ok(None);
        };
        sqlx::query_as::<_, AiModel>(
            "SELECT * FROM ai_models WHERE id = $1 AND is_active = TRUE",
        )
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch AI model for bot")
    }
}
