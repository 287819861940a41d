use thiserror::Error;

/// Failure talking to the payment gateway.
///
/// Every variant is a definitive payment failure for the caller. Nothing in
/// this crate resends a charge on its own; a fresh attempt needs a new
/// idempotency key.
#[derive(Error, Debug)]
pub enum PaymentGatewayError {
    #[error("Gateway configuration error: {0}")]
    Configuration(String),

    #[error("Gateway HTTP error: {0}")]
    Http(String),

    #[error("Gateway request timed out")]
    Timeout,

    #[error("Gateway API error (status {status_code}): {message}")]
    Api { status_code: u16, message: String },

    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("Gateway response did not include a PIX QR code")]
    MissingQrCode,
}

impl PaymentGatewayError {
    /// Status code returned by the gateway, if it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PaymentGatewayError::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PaymentGatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PaymentGatewayError::Timeout
        } else {
            PaymentGatewayError::Http(err.to_string())
        }
    }
}
