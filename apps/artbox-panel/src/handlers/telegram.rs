use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use tracing::{error, warn};

use crate::bot::BotService;
use crate::state::AppState;

/// Inbound Telegram webhook. The token path segment selects the bot; an
/// unknown or disabled token is acknowledged with 200 so Telegram does not
/// retry updates we will never want.
pub async fn handle_update(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<Value>,
) -> (StatusCode, &'static str) {
    let bot_config = match state.bots.resolve_active(&token).await {
        Ok(Some(config)) => config,
        Ok(None) => return (StatusCode::OK, "Bot not found or inactive"),
        Err(e) => {
            error!("Bot lookup failed: {e:#}");
            return (StatusCode::OK, "OK");
        }
    };

    let update: teloxide::types::Update = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(e) => {
            // Unknown update shapes arrive whenever Telegram ships new
            // features; skip them instead of making Telegram retry.
            warn!("Undecodable update for bot {}: {}", bot_config.id, e);
            return (StatusCode::OK, "OK");
        }
    };

    let service = BotService::new(state, bot_config);
    if let Err(e) = service.handle_update(update).await {
        error!("Update handling failed: {e:#}");
    }

    (StatusCode::OK, "OK")
}
