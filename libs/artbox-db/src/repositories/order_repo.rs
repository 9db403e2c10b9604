use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{Order, OrderStatus};

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// New pending order. Created before the remote invoice call, so a
    /// provider failure leaves an inert pending row rather than losing the
    /// attempt.
    pub async fn create(
        &self,
        bot_id: i64,
        user_id: i64,
        plan_id: i64,
        amount: f64,
        currency: &str,
        provider: &str,
    ) -> Result<Order> {
        sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (bot_id, user_id, plan_id, amount, currency, provider, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(bot_id)
        .bind(user_id)
        .bind(plan_id)
        .bind(amount)
        .bind(currency)
        .bind(provider)
        .bind(OrderStatus::PENDING)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create order")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order by id")
    }

    /// Resolve an order for settlement by internal id first, provider id as
    /// fallback. Providers do not agree on which one their callback carries.
    pub async fn find_for_settlement(
        &self,
        internal_id: Option<i64>,
        external_id: Option<&str>,
    ) -> Result<Option<Order>> {
        if internal_id.is_none() && external_id.is_none() {
            return Ok(None);
        }
        sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE ($1::BIGINT IS NOT NULL AND id = $1)
               OR ($2::TEXT IS NOT NULL AND external_id = $2)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(internal_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to resolve order for settlement")
    }

    pub async fn set_external_id(&self, id: i64, external_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE orders SET external_id = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(external_id)
        .execute(&self.pool)
        .await
        .context("Failed to store external order id")?;
        Ok(())
    }

    /// Claim the pending -> paid transition. Returns the updated row only
    /// for the caller that won the claim; every later (or concurrent losing)
    /// caller gets None. This row-level conditional update is the
    /// exactly-once token for settlement.
    pub async fn claim_paid_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: i64,
        external_id: Option<&str>,
        provider_response: &serde_json::Value,
    ) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = $2,
                external_id = COALESCE($3, external_id),
                provider_response = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = $5
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::PAID)
        .bind(external_id)
        .bind(provider_response)
        .bind(OrderStatus::PENDING)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to claim order for settlement")
    }
}
