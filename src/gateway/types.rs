//! PagSeguro request and response shapes.
//!
//! Requests are plain serializable structs. Responses are kept as raw JSON for
//! audit and the fields this crate acts on are pulled out with explicit
//! checks, so a missing id or status fails loudly instead of flowing into a
//! financial record as a null.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::PaymentGatewayError;
use crate::models::transaction::TransactionStatus;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Amount {
    pub value: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub tax_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EncryptedCard {
    pub encrypted: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CardPaymentMethod {
    #[serde(rename = "type")]
    pub method_type: String,
    pub installments: u32,
    pub capture: bool,
    pub card: EncryptedCard,
}

/// Body of `POST {api_url}/charges`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreditCardChargeRequest {
    pub reference_id: String,
    pub description: String,
    pub amount: Amount,
    pub payment_method: CardPaymentMethod,
    pub customer: Customer,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notification_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderItem {
    pub reference_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_amount: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QrCodeAmount {
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QrCodeRequest {
    pub amount: QrCodeAmount,
    pub expiration_date: DateTime<Utc>,
}

/// Body of `POST {api_url}/orders` for a PIX payment.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PixOrderRequest {
    pub reference_id: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub qr_codes: Vec<QrCodeRequest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notification_urls: Vec<String>,
}

/// Charge status as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeStatus {
    Paid,
    Authorized,
    Declined,
    Canceled,
    InAnalysis,
    Waiting,
    Other(String),
}

impl From<&str> for ChargeStatus {
    fn from(value: &str) -> Self {
        match value {
            "PAID" => ChargeStatus::Paid,
            "AUTHORIZED" => ChargeStatus::Authorized,
            "DECLINED" => ChargeStatus::Declined,
            "CANCELED" => ChargeStatus::Canceled,
            "IN_ANALYSIS" => ChargeStatus::InAnalysis,
            "WAITING" => ChargeStatus::Waiting,
            other => ChargeStatus::Other(other.to_string()),
        }
    }
}

impl ChargeStatus {
    /// Local status recorded for a synchronous gateway answer.
    pub fn transaction_status(&self) -> TransactionStatus {
        match self {
            ChargeStatus::Paid | ChargeStatus::Authorized => TransactionStatus::Confirmed,
            ChargeStatus::Declined | ChargeStatus::Canceled => TransactionStatus::Failed,
            _ => TransactionStatus::Pending,
        }
    }
}

/// A charge as returned by `POST /charges` or `GET /charges/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCharge {
    pub id: String,
    pub status: ChargeStatus,

    /// Decline reason, when the gateway gives one
    pub message: Option<String>,

    pub raw: Value,
}

impl GatewayCharge {
    pub fn from_response(raw: Value) -> Result<Self, PaymentGatewayError> {
        let id = required_str(&raw, "/id")?.to_string();
        let status = ChargeStatus::from(required_str(&raw, "/status")?);
        let message = raw
            .pointer("/payment_response/message")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            id,
            status,
            message,
            raw,
        })
    }
}

/// A PIX order as returned by `POST /orders`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixOrder {
    pub transaction_id: String,
    pub qr_code_text: String,
    pub qr_code_base64: Option<String>,
    pub expires_at: Option<String>,
    pub raw: Value,
}

impl PixOrder {
    /// Parse the order body. The QR image is fetched separately.
    pub fn from_response(raw: Value) -> Result<Self, PaymentGatewayError> {
        let transaction_id = required_str(&raw, "/id")?.to_string();
        let qr_code_text = raw
            .pointer("/qr_codes/0/text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or(PaymentGatewayError::MissingQrCode)?
            .to_string();
        let expires_at = raw
            .pointer("/qr_codes/0/expiration_date")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            transaction_id,
            qr_code_text,
            qr_code_base64: None,
            expires_at,
            raw,
        })
    }

    /// Link to the rendered PNG of the first QR code.
    pub fn qr_image_url(&self) -> Option<&str> {
        self.raw
            .pointer("/qr_codes/0/links")
            .and_then(Value::as_array)?
            .iter()
            .find(|link| link.get("rel").and_then(Value::as_str) == Some("QRCODE.PNG"))
            .and_then(|link| link.get("href"))
            .and_then(Value::as_str)
    }
}

fn required_str<'a>(raw: &'a Value, pointer: &str) -> Result<&'a str, PaymentGatewayError> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PaymentGatewayError::MalformedResponse(format!("missing {pointer}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn charge_status_maps_to_local_status() {
        assert_eq!(ChargeStatus::from("PAID").transaction_status(), TransactionStatus::Confirmed);
        assert_eq!(
            ChargeStatus::from("AUTHORIZED").transaction_status(),
            TransactionStatus::Confirmed
        );
        assert_eq!(ChargeStatus::from("DECLINED").transaction_status(), TransactionStatus::Failed);
        assert_eq!(ChargeStatus::from("CANCELED").transaction_status(), TransactionStatus::Failed);
        assert_eq!(
            ChargeStatus::from("IN_ANALYSIS").transaction_status(),
            TransactionStatus::Pending
        );
        assert_eq!(
            ChargeStatus::from("SOMETHING_NEW").transaction_status(),
            TransactionStatus::Pending
        );
    }

    #[test]
    fn charge_without_status_is_malformed() {
        let err = GatewayCharge::from_response(json!({ "id": "CHAR_1" })).unwrap_err();
        assert!(matches!(err, PaymentGatewayError::MalformedResponse(_)));
    }

    #[test]
    fn charge_decline_message_is_extracted() {
        let charge = GatewayCharge::from_response(json!({
            "id": "CHAR_1",
            "status": "DECLINED",
            "payment_response": { "code": "20007", "message": "NAO AUTORIZADA" }
        }))
        .unwrap();
        assert_eq!(charge.status, ChargeStatus::Declined);
        assert_eq!(charge.message.as_deref(), Some("NAO AUTORIZADA"));
    }

    #[test]
    fn pix_order_requires_qr_text() {
        let err = PixOrder::from_response(json!({ "id": "ORDE_1", "qr_codes": [] })).unwrap_err();
        assert!(matches!(err, PaymentGatewayError::MissingQrCode));
    }

    #[test]
    fn pix_order_exposes_png_link() {
        let order = PixOrder::from_response(json!({
            "id": "ORDE_1",
            "qr_codes": [{
                "text": "00020101021226830014br.gov.bcb.pix",
                "expiration_date": "2025-01-01T12:00:00-03:00",
                "links": [
                    { "rel": "QRCODE.BASE64", "href": "https://api/qrcode/1/base64" },
                    { "rel": "QRCODE.PNG", "href": "https://api/qrcode/1/png" }
                ]
            }]
        }))
        .unwrap();
        assert_eq!(order.qr_image_url(), Some("https://api/qrcode/1/png"));
        assert_eq!(order.expires_at.as_deref(), Some("2025-01-01T12:00:00-03:00"));
    }
}
