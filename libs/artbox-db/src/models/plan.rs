use chrono::{DateTime, Utc};
use serde::Serialize;

/// Purchasable bundle of credits at a fixed price. Immutable reference data
/// during checkout.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Plan {
    pub id: i64,
    pub bot_id: i64,
    pub name: String,
    pub price: f64,
    pub currency: String,
    /// Price in Telegram Stars for the in-chat native payment rail.
    pub stars_price: Option<i64>,
    pub credits: i64,
    pub description: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
