use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Plan;

#[derive(Debug, Clone)]
pub struct PlanRepository {
    pool: PgPool,
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Plan>> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch plan by id")
    }

    pub async fn get_active_for_bot(&self, bot_id: i64) -> Result<Vec<Plan>> {
        sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE bot_id = $1 AND is_active = TRUE
             ORDER BY sort_order, price",
        )
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch active plans for bot")
    }
}
