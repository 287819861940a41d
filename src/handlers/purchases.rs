//! Gift purchase HTTP handler.
//!
//! - POST /api/v1/gifts/{gift_id}/purchase - Start a card or PIX payment

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::transaction::{PurchaseRequest, PurchaseResponse},
};

/// Purchase one unit of a gift.
///
/// # Request Body
///
/// ```json
/// {
///   "payment_method": "pix",
///   "idempotency_key": "c2f1d8e0-buy-42",
///   "payer": { "name": "Ana Souza", "email": "ana@example.com", "tax_id": "12345678909" }
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "transaction_id": "TXN-8K2M4P6R1T3V5X7Z",
///   "status": "pending",
///   "payment_method": "pix",
///   "qr_code": "iVBORw0KGgo...",
///   "qr_code_text": "00020101021226830014br.gov.bcb.pix..."
/// }
/// ```
///
/// # Errors
///
/// - **404**: unknown gift
/// - **422**: gift unavailable, malformed body, or validation failed
/// - **400**: the payment provider refused the charge
///
/// Retrying with the same `idempotency_key` returns the original
/// transaction without charging again.
pub async fn create_purchase(
    State(state): State<AppState>,
    Path(gift_id): Path<Uuid>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let Json(request) = payload?;
    let gift = state.payments.gift_item(gift_id).await?;
    let response = state.payments.purchase(&gift, request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}
