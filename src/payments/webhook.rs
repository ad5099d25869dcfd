//! Paystack and Moniepoint webhook handlers with signature verification

use std::future::Future;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{error, info, warn};

use super::moniepoint::{self, MoniepointEvent};
use super::paystack::{self, PaystackEvent};
use super::reconcile::{DepositOutcome, ReconcileError, TransferOutcome};
use super::signature;
use crate::app::AppState;
use crate::store::StoreError;

/// Handle Paystack webhook events
pub async fn paystack_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    verify_signature(
        &headers,
        paystack::SIGNATURE_HEADER,
        &body,
        &state.config.paystack_secret_key,
    )?;

    let event: PaystackEvent = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Failed to parse Paystack event");
        WebhookError::InvalidPayload
    })?;

    info!(event_type = %event.event, "Received Paystack webhook");

    match event.event.as_str() {
        paystack::CHARGE_SUCCESS => {
            let deposit = event.to_deposit().ok_or(WebhookError::InvalidEventData)?;
            let reconciler = state.reconciler.clone();
            let outcome = detached(async move { reconciler.apply_deposit(&deposit).await }).await?;
            Ok(deposit_response(outcome))
        }
        paystack::TRANSFER_SUCCESS => {
            let transfer = event.to_transfer().ok_or(WebhookError::InvalidEventData)?;
            let reconciler = state.reconciler.clone();
            match detached(async move { reconciler.settle_transfer(&transfer).await }).await? {
                TransferOutcome::Settled { fee, .. } => Ok(message(
                    "Transfer processed successfully",
                    json!({ "networkFee": fee }),
                )),
                TransferOutcome::Duplicate => Ok(duplicate()),
            }
        }
        _ => {
            info!(event_type = %event.event, "Unhandled event type");
            Ok(ignored())
        }
    }
}

/// Handle Moniepoint (Monnify) webhook events
pub async fn moniepoint_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    verify_signature(
        &headers,
        moniepoint::SIGNATURE_HEADER,
        &body,
        &state.config.moniepoint_client_secret,
    )?;

    let event: MoniepointEvent = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Failed to parse Moniepoint event");
        WebhookError::InvalidPayload
    })?;

    info!(event_type = %event.event_type, "Received Moniepoint webhook");

    if event.event_type != moniepoint::SUCCESSFUL_TRANSACTION {
        info!(event_type = %event.event_type, "Unhandled event type");
        return Ok(ignored());
    }

    let deposit = event.to_deposit().ok_or(WebhookError::InvalidEventData)?;
    let reconciler = state.reconciler.clone();
    let outcome = detached(async move { reconciler.apply_deposit(&deposit).await }).await?;
    Ok(deposit_response(outcome))
}

/// Run reconciliation on its own task. Once a reference is claimed the
/// credit must finish even if the request times out or the client hangs up.
async fn detached<T, F>(work: F) -> Result<T, WebhookError>
where
    F: Future<Output = Result<T, ReconcileError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result.map_err(WebhookError::from),
        Err(e) => {
            error!(error = %e, "Reconciliation task failed");
            Err(WebhookError::Interrupted)
        }
    }
}

fn verify_signature(
    headers: &HeaderMap,
    header_name: &str,
    body: &[u8],
    secret: &str,
) -> Result<(), WebhookError> {
    let provided = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    if !signature::verify(body, provided, secret) {
        warn!(header = header_name, "Webhook signature mismatch");
        return Err(WebhookError::InvalidSignature);
    }
    Ok(())
}

fn message(text: &str, extra: serde_json::Value) -> Response {
    let mut body = json!({ "message": text });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    (StatusCode::OK, Json(body)).into_response()
}

fn deposit_response(outcome: DepositOutcome) -> Response {
    match outcome {
        DepositOutcome::Applied {
            user_id,
            referral_paid,
            tier,
        } => message(
            "Payment processed successfully",
            json!({
                "userId": user_id,
                "tier": tier,
                "referralPaid": referral_paid,
            }),
        ),
        DepositOutcome::Duplicate => duplicate(),
    }
}

fn duplicate() -> Response {
    message("Duplicate transaction ignored", json!({}))
}

fn ignored() -> Response {
    message("Event ignored", json!({}))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing webhook signature header")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid request payload")]
    InvalidPayload,

    #[error("Invalid event data")]
    InvalidEventData,

    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    #[error("Reconciliation interrupted")]
    Interrupted,
}

impl From<ReconcileError> for WebhookError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UserNotFound => WebhookError::UserNotFound,
            ReconcileError::InsufficientBalance { available, required } => {
                warn!(available, required, "Transfer exceeds balance");
                WebhookError::InsufficientBalance
            }
            ReconcileError::Store(e) => WebhookError::Database(e),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSignature => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload => StatusCode::BAD_REQUEST,
            WebhookError::InvalidEventData => StatusCode::BAD_REQUEST,
            WebhookError::UserNotFound => StatusCode::NOT_FOUND,
            WebhookError::InsufficientBalance => StatusCode::BAD_REQUEST,
            WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::Interrupted => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            WebhookError::Database(e) => {
                error!(error = %e, "Webhook processing failed");
                "Internal server error".to_string()
            }
            WebhookError::Interrupted => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
