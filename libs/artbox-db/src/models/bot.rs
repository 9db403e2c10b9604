use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One rented bot. The token is the routing key for inbound Telegram
/// webhooks; `is_active` gates whether updates are processed at all.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BotConfig {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub username: Option<String>,
    pub is_active: bool,
    pub config: serde_json::Value,
    pub ai_model_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-form per-bot settings stored in the `config` JSON column.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BotSettings {
    pub welcome_text: Option<String>,
    pub support_url: Option<String>,
    pub offer_url: Option<String>,
}

impl BotConfig {
    pub fn settings(&self) -> BotSettings {
        serde_json::from_value(self.config.clone()).unwrap_or_default()
    }
}
