use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::services::payment::{heleket, lava, wata, ProviderCallback, SettleOutcome};
use crate::state::AppState;

/// Webhooks answer 2xx for everything the provider could plausibly retry
/// into a duplicate: unknown orders, non-terminal statuses, repeats. Only a
/// request we can prove illegitimate (bad source IP, undecodable body) gets
/// a non-2xx. Settlement preconditions (paid status, usable ids) are
/// enforced inside `settle` itself.
async fn settle_normalized(state: &AppState, provider_name: &str, callback: ProviderCallback) {
    match state.payments.settle(callback).await {
        Ok(SettleOutcome::Settled {
            order_id,
            credits_added,
            new_balance,
        }) => info!(
            "[{}] order {} settled, +{} credits, balance {}",
            provider_name, order_id, credits_added, new_balance
        ),
        Ok(SettleOutcome::AlreadySettled) => {
            info!("[{}] duplicate callback ignored", provider_name)
        }
        Ok(SettleOutcome::NotPaid) => {}
        Ok(SettleOutcome::OrderNotFound) => {
            warn!("[{}] callback with no matching order", provider_name)
        }
        Err(e) => error!("[{}] settlement failed: {e:#}", provider_name),
    }
}

/// Source address for allowlist checks. Proxies in front of the panel put
/// the real client in X-Forwarded-For; otherwise the socket peer is it.
pub(crate) fn client_ip(headers: &HeaderMap, remote: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| remote.ip().to_string())
}

pub async fn handle_lava(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let ip = client_ip(&headers, remote);
    if !lava::ALLOWED_IPS.contains(&ip.as_str()) {
        warn!("[lava_ru] blocked callback from {}", ip);
        return (StatusCode::FORBIDDEN, "Access denied").into_response();
    }

    let callback: lava::LavaCallback = match serde_json::from_value(body.clone()) {
        Ok(cb) => cb,
        Err(e) => {
            warn!("[lava_ru] undecodable callback: {}", e);
            return (StatusCode::BAD_REQUEST, "Bad payload").into_response();
        }
    };

    settle_normalized(&state, "lava_ru", lava::normalize(callback, body)).await;
    (StatusCode::OK, "OK").into_response()
}

pub async fn handle_wata(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let callback: wata::WataCallback = match serde_json::from_value(body.clone()) {
        Ok(cb) => cb,
        Err(e) => {
            warn!("[wata] undecodable callback: {}", e);
            return (StatusCode::BAD_REQUEST, "Bad payload").into_response();
        }
    };

    settle_normalized(&state, "wata", wata::normalize(callback, body)).await;
    (StatusCode::OK, "OK").into_response()
}

pub async fn handle_heleket(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let callback: heleket::HeleketCallback = match serde_json::from_value(body.clone()) {
        Ok(cb) => cb,
        Err(e) => {
            warn!("[heleket] undecodable callback: {}", e);
            return (StatusCode::BAD_REQUEST, "Bad payload").into_response();
        }
    };

    settle_normalized(&state, "heleket", heleket::normalize(callback, body)).await;
    // Heleket expects its own ack shape back.
    Json(json!({ "state": 0 })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn forwarded_header_wins_over_socket_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("62.122.173.38, 10.0.0.1"),
        );
        assert_eq!(
            client_ip(&headers, addr("127.0.0.1:9000")),
            "62.122.173.38"
        );
    }

    #[test]
    fn socket_peer_used_without_forwarded_header() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, addr("91.227.144.73:443")), "91.227.144.73");
    }

    #[test]
    fn lava_allowlist_rejects_unknown_sources() {
        assert!(lava::ALLOWED_IPS.contains(&"31.133.222.20"));
        assert!(!lava::ALLOWED_IPS.contains(&"8.8.8.8"));
    }
}
