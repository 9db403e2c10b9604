use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::services::payment::{ProviderCallback, SettleOutcome};
use crate::state::AppState;

/// Shared-secret check for the internal admin API. The dashboard proxies
/// these calls server-side; the token never reaches a browser.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() || presented != state.config.admin_token {
        return Err((StatusCode::UNAUTHORIZED, "Invalid admin token").into_response());
    }
    Ok(())
}

fn internal_error(e: anyhow::Error) -> Response {
    error!("Admin request failed: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}

/// Manual settlement for an order whose provider callback never arrived.
/// Runs through the same claim path as the webhooks, so approving an
/// already-settled order is a no-op, not a double credit.
pub async fn approve_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let callback = ProviderCallback {
        internal_id: Some(order_id),
        external_id: None,
        paid: true,
        raw: json!({
            "manual_approve_by": "admin",
            "timestamp": Utc::now().to_rfc3339(),
        }),
    };

    match state.payments.settle(callback).await {
        Ok(SettleOutcome::Settled {
            order_id,
            credits_added,
            new_balance,
        }) => {
            info!("Order {} approved manually", order_id);
            Json(json!({
                "status": "settled",
                "order_id": order_id,
                "credits_added": credits_added,
                "new_balance": new_balance,
            }))
            .into_response()
        }
        Ok(SettleOutcome::AlreadySettled) => {
            Json(json!({ "status": "already_settled" })).into_response()
        }
        // Unreachable for the synthetic paid callback built above.
        Ok(SettleOutcome::NotPaid) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "callback not marked paid" })),
        )
            .into_response(),
        Ok(SettleOutcome::OrderNotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "order not found" })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    pub bot_id: i64,
    pub user_id: i64,
    /// Signed correction. Applied unconditionally; a forced negative
    /// adjustment may drive the balance below zero.
    pub amount: i64,
}

pub async fn adjust_credits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdjustCreditsRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    match state.ledger.credit(req.bot_id, req.user_id, req.amount).await {
        Ok(new_balance) => Json(json!({ "new_balance": new_balance })).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBroadcastRequest {
    pub bot_id: i64,
    pub message: String,
    pub image_url: Option<String>,
}

/// Accepts the broadcast and returns immediately; delivery runs detached
/// and reports through the broadcasts table counters.
pub async fn create_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBroadcastRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let broadcast_id = match state
        .broadcasts
        .create(req.bot_id, &req.message, req.image_url.as_deref())
        .await
    {
        Ok(id) => id,
        Err(e) => return internal_error(e),
    };

    let broadcasts = state.broadcasts.clone();
    tokio::spawn(async move {
        broadcasts.run(broadcast_id).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "broadcast_id": broadcast_id })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct SendPersonalRequest {
    pub bot_id: i64,
    pub user_id: i64,
    pub message: String,
}

pub async fn send_personal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendPersonalRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    match state
        .broadcasts
        .send_personal(req.bot_id, req.user_id, &req.message)
        .await
    {
        Ok(()) => Json(json!({ "status": "sent" })).into_response(),
        Err(e) => internal_error(e),
    }
}
