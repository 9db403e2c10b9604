use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AiModel {
    pub id: i64,
    pub name: String,
    /// Provider-side model identifier, e.g. "black-forest-labs/flux-dev".
    pub slug: String,
    /// Cost of one generation in USD. Drives the credit price of a prompt.
    pub cost_usd: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
