use anyhow::{Context, Result};
use sqlx::PgPool;

/// One credit buys one cent of underlying generation cost.
pub const BASE_CREDIT_UNIT_USD: f64 = 0.01;

/// Credits charged for one generation with the given model cost. Rounds up:
/// the ledger never undercharges a fractional cent.
pub fn required_credits(model_cost_usd: f64) -> i64 {
    (model_cost_usd / BASE_CREDIT_UNIT_USD).ceil() as i64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Ok { new_balance: i64 },
    InsufficientCredit { available: i64 },
}

/// Owner of the per-(bot, user) credit balance.
///
/// Every mutation is a single conditional SQL statement, so two racing
/// webhooks can never interleave into a lost update. Nothing else in the
/// codebase is allowed to write `bot_users.credits`.
#[derive(Debug, Clone)]
pub struct CreditLedger {
    pool: PgPool,
}

impl CreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current balance; zero when the pair has never been seen.
    pub async fn balance(&self, bot_id: i64, user_id: i64) -> Result<i64> {
        let credits: Option<i64> = sqlx::query_scalar(
            "SELECT credits FROM bot_users WHERE bot_id = $1 AND user_id = $2",
        )
        .bind(bot_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch credit balance")?;
        Ok(credits.unwrap_or(0))
    }

    /// Idempotent first-touch creation. An existing balance is returned
    /// unchanged; the initial grant is applied at most once.
    pub async fn ensure(&self, bot_id: i64, user_id: i64, initial_grant: i64) -> Result<i64> {
        sqlx::query(
            "INSERT INTO bot_users (bot_id, user_id, credits) VALUES ($1, $2, $3)
             ON CONFLICT (bot_id, user_id) DO NOTHING",
        )
        .bind(bot_id)
        .bind(user_id)
        .bind(initial_grant)
        .execute(&self.pool)
        .await
        .context("Failed to ensure credit balance row")?;

        self.balance(bot_id, user_id).await
    }

    /// Conditional decrement. Fails closed: when the stored balance is below
    /// `amount` the row is left untouched and the available balance is
    /// reported back. Of two concurrent debits racing over the same credits,
    /// exactly one wins.
    pub async fn debit(&self, bot_id: i64, user_id: i64, amount: i64) -> Result<DebitOutcome> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE bot_users
             SET credits = credits - $3, updated_at = CURRENT_TIMESTAMP
             WHERE bot_id = $1 AND user_id = $2 AND credits >= $3
             RETURNING credits",
        )
        .bind(bot_id)
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to debit credits")?;

        match updated {
            Some(new_balance) => Ok(DebitOutcome::Ok { new_balance }),
            None => {
                let available = self.balance(bot_id, user_id).await?;
                Ok(DebitOutcome::InsufficientCredit { available })
            }
        }
    }

    /// Unconditional increment (admin corrections may pass a negative
    /// amount). Creates the row on first settlement for an unseen pair.
    pub async fn credit(&self, bot_id: i64, user_id: i64, amount: i64) -> Result<i64> {
        let new_balance: i64 = sqlx::query_scalar(
            "INSERT INTO bot_users (bot_id, user_id, credits) VALUES ($1, $2, $3)
             ON CONFLICT (bot_id, user_id) DO UPDATE
             SET credits = bot_users.credits + EXCLUDED.credits,
                 updated_at = CURRENT_TIMESTAMP
             RETURNING credits",
        )
        .bind(bot_id)
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .context("Failed to credit balance")?;
        Ok(new_balance)
    }

    /// Same increment inside an open settlement transaction, so the
    /// pending -> paid claim and the credit commit or roll back together.
    pub async fn credit_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        bot_id: i64,
        user_id: i64,
        amount: i64,
    ) -> Result<i64> {
        let new_balance: i64 = sqlx::query_scalar(
            "INSERT INTO bot_users (bot_id, user_id, credits) VALUES ($1, $2, $3)
             ON CONFLICT (bot_id, user_id) DO UPDATE
             SET credits = bot_users.credits + EXCLUDED.credits,
                 updated_at = CURRENT_TIMESTAMP
             RETURNING credits",
        )
        .bind(bot_id)
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await
        .context("Failed to credit balance in settlement transaction")?;
        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_rounds_up_to_whole_credits() {
        // $0.035 at one cent per credit is 3.5 credits; charge 4, never 3.
        assert_eq!(required_credits(0.035), 4);
    }

    #[test]
    fn exact_cent_costs_are_not_inflated() {
        assert_eq!(required_credits(0.01), 1);
        assert_eq!(required_credits(0.03), 3);
        assert_eq!(required_credits(0.10), 10);
    }

    #[test]
    fn sub_cent_cost_still_charges_one_credit() {
        assert_eq!(required_credits(0.004), 1);
    }
}
