//! Transaction HTTP handlers.
//!
//! - GET /api/v1/transactions/{internal_id} - Poll a payment's status

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::{app::AppState, error::AppError, models::transaction::TransactionStatusResponse};

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Ask the gateway for the latest status of a pending card charge
    #[serde(default)]
    pub refresh: bool,
}

/// Get a transaction's status by its `TXN-` reference.
///
/// PIX payments complete asynchronously, so the purchase page polls this
/// until the status leaves `pending`.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(internal_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<TransactionStatusResponse>, AppError> {
    let transaction = if query.refresh {
        state.payments.refresh_from_gateway(&internal_id).await?
    } else {
        state.payments.find_transaction(&internal_id).await?
    };

    Ok(Json(transaction.into()))
}
