use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-(bot, provider) payment credentials. The `credentials` JSON shape is
/// provider-specific and parsed by the matching adapter.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BotPaymentConfig {
    pub id: i64,
    pub bot_id: i64,
    pub provider: String,
    pub is_enabled: bool,
    pub credentials: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
