use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::ChatState;

/// Durable per-(bot, chat) conversation state. Kept in the database rather
/// than process memory so horizontally scaled instances agree on where a
/// chat is in the Idle/AwaitingPrompt machine.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Missing rows read as Idle; a session row is only materialized on the
    /// first transition away from it.
    pub async fn get_state(&self, bot_id: i64, chat_id: i64) -> Result<ChatState> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT state FROM chat_sessions WHERE bot_id = $1 AND chat_id = $2",
        )
        .bind(bot_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch chat session state")?;
        Ok(raw.as_deref().map(ChatState::parse).unwrap_or_default())
    }

    pub async fn set_state(&self, bot_id: i64, chat_id: i64, state: ChatState) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_sessions (bot_id, chat_id, state) VALUES ($1, $2, $3)
             ON CONFLICT (bot_id, chat_id) DO UPDATE
             SET state = EXCLUDED.state, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(bot_id)
        .bind(chat_id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to store chat session state")?;
        Ok(())
    }
}
