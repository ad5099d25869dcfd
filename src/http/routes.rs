//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::accounts::handlers::{
    admin_users_handler, bonus_handler, checkout_key_handler, daily_handler,
    investment_update_handler, pending_payment_handler, register_handler, sync_handler,
    withdrawal_handler,
};
use crate::app::AppState;
use crate::http::middleware::{
    rate_limit, require_admin, require_client, require_client_origin, API_KEY_HEADER,
};
use crate::mail::campaign_handler;
use crate::payments::webhook::{moniepoint_webhook_handler, paystack_webhook_handler};
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let allowed_origins: Vec<HeaderValue> = state
        .config
        .all_origins()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    // Providers call these directly; the HMAC signature is the guard
    let webhook_routes = Router::new()
        .route("/api/webhook", post(paystack_webhook_handler))
        .route("/api/webhook/paystack", post(paystack_webhook_handler))
        .route("/api/webhook/moniepoint", post(moniepoint_webhook_handler));

    let client_routes = Router::new()
        .route("/api/userData", post(register_handler))
        .route("/api/bonus", post(bonus_handler))
        .route("/api/daily", post(daily_handler))
        .route("/api/update", post(investment_update_handler))
        .route("/api/get", post(sync_handler))
        .route("/api/data", post(withdrawal_handler))
        .route("/api/pendingpay", post(pending_payment_handler))
        .route("/api/email", post(campaign_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_client));

    let admin_routes = Router::new()
        .route("/api/adminsdk", get(admin_users_handler).post(admin_users_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let checkout_routes = Router::new()
        .route("/api/massage", post(checkout_key_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_client_origin,
        ));

    let api_routes = Router::new()
        .merge(webhook_routes)
        .merge(client_routes)
        .merge(admin_routes)
        .merge(checkout_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    store: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        store: state.db.backend(),
    })
}
