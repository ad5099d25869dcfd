//! Request guards: allowed origins, static API key, global rate limit

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::app::AppState;
use crate::http::AppError;

/// Header carrying the static API key
pub const API_KEY_HEADER: &str = "x-api-key";

fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    headers
        .get(header::ORIGIN)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|origin| allowed.iter().any(|a| a == origin))
}

fn api_key_valid(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|key| !expected.is_empty() && key == expected)
}

fn check_origin(request: &Request, allowed: &[String]) -> Result<(), AppError> {
    if origin_allowed(request.headers(), allowed) {
        return Ok(());
    }
    warn!(
        origin = ?request.headers().get(header::ORIGIN),
        path = %request.uri().path(),
        "Request from disallowed origin"
    );
    Err(AppError::Forbidden)
}

fn check_api_key(request: &Request, expected: &str) -> Result<(), AppError> {
    if api_key_valid(request.headers(), expected) {
        return Ok(());
    }
    warn!(path = %request.uri().path(), "Missing or wrong API key");
    Err(AppError::Unauthorized)
}

/// Client origin plus API key
pub async fn require_client(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_origin(&request, &state.config.client_origins)?;
    check_api_key(&request, &state.config.api_auth_key)?;
    Ok(next.run(request).await)
}

/// Admin origin plus API key
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_origin(&request, &state.config.admin_origins)?;
    check_api_key(&request, &state.config.api_auth_key)?;
    Ok(next.run(request).await)
}

/// Client origin only
pub async fn require_client_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_origin(&request, &state.config.client_origins)?;
    Ok(next.run(request).await)
}

/// Shared quota over all `/api` traffic
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.limiter.check().is_err() {
        warn!(path = %request.uri().path(), "Rate limit exceeded");
        return Err(AppError::TooManyRequests);
    }
    Ok(next.run(request).await)
}
