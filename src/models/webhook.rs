//! Webhook models for inbound PagSeguro notifications.
//!
//! # Payload
//!
//! ```json
//! {
//!   "event_type": "CHARGE.PAID",
//!   "data": {
//!     "id": "CHAR_5A6B7C8D",
//!     "status": "PAID",
//!     "error_message": null
//!   }
//! }
//! ```
//!
//! The body is signed with HMAC-SHA256 over the raw bytes; the hex digest
//! arrives in the `X-PagSeguro-Signature` header.

use serde::Deserialize;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "X-PagSeguro-Signature";

/// Decline message used when the gateway gives none.
pub const DEFAULT_DECLINE_MESSAGE: &str = "Payment was declined by the payment provider";

/// Parsed webhook notification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub data: ChargeEventData,
}

/// The charge an event refers to.
///
/// Only `id` is required; everything else the gateway sends is kept in the
/// raw payload for audit.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeEventData {
    pub id: String,

    /// Our `internal_id`, echoed back by the gateway
    #[serde(default)]
    pub reference_id: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub error_message: Option<String>,
}

/// What the handler does with an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Confirm,
    Fail,
    Ignore,
}

impl EventAction {
    pub fn for_event_type(event_type: &str) -> Self {
        match event_type {
            "CHARGE.PAID" | "CHARGE.AUTHORIZED" => EventAction::Confirm,
            "CHARGE.DECLINED" | "CHARGE.CANCELED" => EventAction::Fail,
            _ => EventAction::Ignore,
        }
    }
}

impl WebhookEvent {
    pub fn action(&self) -> EventAction {
        EventAction::for_event_type(&self.event_type)
    }

    /// Message recorded on a failed transaction.
    pub fn failure_message(&self) -> String {
        self.data
            .error_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DECLINE_MESSAGE.to_string())
    }
}
