use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, payment, telegram};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Inbound Telegram updates, keyed by bot token.
        .route("/webhooks/telegram/{token}", post(telegram::handle_update))
        // Asynchronous payment-provider callbacks.
        .route("/webhooks/payment/lava_ru", post(payment::handle_lava))
        .route("/webhooks/payment/wata", post(payment::handle_wata))
        .route("/webhooks/payment/heleket", post(payment::handle_heleket))
        // Internal admin API (shared-secret header; the dashboard UI lives
        // elsewhere and talks to these endpoints).
        .route("/admin/orders/{id}/approve", post(admin::approve_order))
        .route("/admin/credits", post(admin::adjust_credits))
        .route("/admin/broadcasts", post(admin::create_broadcast))
        .route("/admin/messages", post(admin::send_personal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
