use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::BotPaymentConfig;

#[derive(Debug, Clone)]
pub struct PaymentConfigRepository {
    pool: PgPool,
}

impl PaymentConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_enabled(
        &self,
        bot_id: i64,
        provider: &str,
    ) -> Result<Option<BotPaymentConfig>> {
        sqlx::query_as::<_, BotPaymentConfig>(
            "SELECT * FROM bot_payment_configs
             WHERE bot_id = $1 AND provider = $2 AND is_enabled = TRUE",
        )
        .bind(bot_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch payment config")
    }

    pub async fn list_enabled(&self, bot_id: i64) -> Result<Vec<BotPaymentConfig>> {
        sqlx::query_as::<_, BotPaymentConfig>(
            "SELECT * FROM bot_payment_configs
             WHERE bot_id = $1 AND is_enabled = TRUE
             ORDER BY provider",
        )
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list enabled payment configs")
    }
}
