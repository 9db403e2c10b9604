use chrono::{DateTime, Utc};
use serde::Serialize;

/// One checkout attempt against one payment provider for one plan.
///
/// Status only ever moves pending -> paid or pending -> canceled; paid is
/// terminal. The pending -> paid transition is claimed with a conditional
/// UPDATE, which is what makes settlement exactly-once.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub bot_id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub amount: f64,
    pub currency: String,
    pub provider: String,
    pub status: String,
    /// Provider-side invoice/transaction id, unknown until the remote
    /// invoice is created (or until the first callback carries it).
    pub external_id: Option<String>,
    /// Raw provider callback payload, stored for audit.
    pub provider_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct OrderStatus;

impl OrderStatus {
    pub const PENDING: &'static str = "pending";
    pub const PAID: &'static str = "paid";
    pub const CANCELED: &'static str = "canceled";
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::PENDING
    }

    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::PAID
    }
}
