//! HTTP handler for PagSeguro webhook notifications.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::{app::AppState, error::AppError, models::webhook::SIGNATURE_HEADER};

/// Receive a PagSeguro notification.
///
/// # Endpoint
///
/// `POST /webhooks/pagseguro`
///
/// # Response
///
/// - **204**: processed, already processed, ignored, or unknown transaction
/// - **400**: invalid signature or body (the gateway does not retry)
/// - **500**: processing failed (the gateway retries later)
///
/// The body is taken as raw bytes: the signature covers them exactly.
pub async fn pagseguro_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    state.webhooks.handle(&body, signature).await?;

    Ok(StatusCode::NO_CONTENT)
}
