//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{gateway::PaymentGatewayError, services::fee_calculator::FeeError};

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation**: malformed idempotency key, unknown payment method,
///   missing card token
/// - **Availability**: gift sold out or disabled
/// - **Webhook authenticity**: bad signature or unparseable body
/// - **Gateway**: the payment provider refused or could not be reached
/// - **Configuration / Database**: server-side faults, details hidden
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request data failed validation.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("{0}")]
    InvalidArgument(String),

    /// The gift cannot be purchased right now.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("{0}")]
    Unavailable(String),

    /// Inbound webhook rejected before any processing.
    ///
    /// Returns HTTP 400 Bad Request. The gateway does not retry these.
    #[error("{0}")]
    InvalidWebhook(String),

    /// The payment provider rejected or failed the charge.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error(transparent)]
    Gateway(#[from] PaymentGatewayError),

    /// Requested resource does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A stored response could not be encoded.
    ///
    /// Returns HTTP 500 Internal Server Error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server-side configuration is unusable (e.g. fee settings).
    ///
    /// Returns HTTP 500 Internal Server Error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

impl From<FeeError> for AppError {
    fn from(err: FeeError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl AppError {
    /// Status code this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) | AppError::Unavailable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InvalidWebhook(_) | AppError::Gateway(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Serialization(_) | AppError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": "Unavailable",
///   "message": "This gift is no longer available"
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, message) = match &self {
            AppError::InvalidArgument(msg) => ("Validation", msg.clone()),
            AppError::Unavailable(msg) => ("Unavailable", msg.clone()),
            AppError::InvalidWebhook(msg) => ("InvalidWebhook", msg.clone()),
            AppError::Gateway(err) => ("PaymentFailed", err.to_string()),
            AppError::NotFound(_) => ("NotFound", self.to_string()),
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                ("InternalError", "An internal error occurred".to_string())
            }
            AppError::Serialization(err) => {
                tracing::error!(error = %err, "serialization error");
                ("InternalError", "An internal error occurred".to_string())
            }
            AppError::Configuration(msg) => {
                tracing::error!(error = %msg, "configuration error");
                ("InternalError", "An internal error occurred".to_string())
            }
        };

        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_category() {
        assert_eq!(
            AppError::Unavailable("sold out".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::InvalidArgument("bad key".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::InvalidWebhook("invalid signature".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Gateway(PaymentGatewayError::Api {
                status_code: 402,
                message: "declined".into()
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Configuration("fee".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
