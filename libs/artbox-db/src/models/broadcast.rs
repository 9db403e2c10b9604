use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Broadcast {
    pub id: i64,
    pub bot_id: i64,
    pub message: String,
    pub image_url: Option<String>,
    pub status: String,
    pub total_users: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct BroadcastStatus;

impl BroadcastStatus {
    pub const PENDING: &'static str = "pending";
    pub const PROCESSING: &'static str = "processing";
    pub const COMPLETED: &'static str = "completed";
    pub const FAILED: &'static str = "failed";
}
