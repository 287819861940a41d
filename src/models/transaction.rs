//! Transaction data models and API request/response types.
//!
//! This module defines:
//! - `Transaction`: a payment attempt for one gift item
//! - `NewTransaction`: the pending row written at charge creation
//! - `PurchaseRequest` / `PurchaseResponse`: the purchase endpoint bodies
//! - `TransactionStatusResponse`: the status polling body

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ParseEnumError, registry_config::FeeModality};
use crate::services::fee_calculator::FeeBreakdown;

/// Key under which the rendered PIX QR image is kept inside `gateway_response`.
pub const QR_CODE_IMAGE_KEY: &str = "qr_code_base64";

/// How the guest pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Pix,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Pix => "pix",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "pix" => Ok(PaymentMethod::Pix),
            other => Err(ParseEnumError::new("payment method", other)),
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle state of a payment attempt.
///
/// `pending` moves to `confirmed` or `failed`; those never move back.
/// `refunded` is written only by a separate refund flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(ParseEnumError::new("transaction status", other)),
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents a payment attempt record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. Fee settings are snapshotted at
/// creation, so later edits to the registry configuration never change
/// historical rows. `gross_amount == net_amount_couple + platform_amount`
/// holds for every row (enforced by a CHECK constraint).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,

    /// Human-legible reference shown to guests and sent to the gateway
    pub internal_id: String,

    /// Gateway charge/order id, NULL until the gateway responds
    pub gateway_transaction_id: Option<String>,

    pub wedding_id: Uuid,
    pub gift_item_id: Uuid,
    pub original_unit_price: i64,
    pub fee_basis_points: i32,

    #[sqlx(try_from = "String")]
    pub fee_modality: FeeModality,

    pub fee_amount: i64,
    pub gross_amount: i64,
    pub net_amount_couple: i64,
    pub platform_amount: i64,

    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,

    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,

    pub error_message: Option<String>,

    /// Raw gateway responses and webhook payloads, kept for audit
    pub gateway_response: Option<serde_json::Value>,

    /// Set only by the confirmation webhook, together with the inventory move
    pub confirmed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Whether the confirmation webhook has already been applied.
    pub fn is_confirmed(&self) -> bool {
        self.status == TransactionStatus::Confirmed && self.confirmed_at.is_some()
    }

    /// PIX copy-and-paste text and QR image recorded from the gateway order.
    pub fn pix_qr_code(&self) -> Option<PixQrCode> {
        if self.payment_method != PaymentMethod::Pix {
            return None;
        }
        let response = self.gateway_response.as_ref()?;
        let text = response
            .pointer("/qr_codes/0/text")
            .and_then(|v| v.as_str())?
            .to_string();
        let image_base64 = response
            .get(QR_CODE_IMAGE_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Some(PixQrCode { text, image_base64 })
    }
}

/// QR code data a guest needs to complete a PIX payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PixQrCode {
    pub text: String,
    pub image_base64: Option<String>,
}

/// Values for a freshly created `pending` transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub internal_id: String,
    pub wedding_id: Uuid,
    pub gift_item_id: Uuid,
    pub original_unit_price: i64,
    pub fee_basis_points: i32,
    pub fee_modality: FeeModality,
    pub amounts: FeeBreakdown,
    pub payment_method: PaymentMethod,
}

/// Generate a globally unique, human-legible transaction reference.
///
/// Format: `TXN-` followed by 16 uppercase alphanumeric characters.
pub fn generate_internal_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("TXN-{suffix}")
}

/// Guest identity forwarded to the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Payer {
    pub name: String,
    pub email: String,

    /// CPF/CNPJ digits
    pub tax_id: String,
}

/// Request body for purchasing a gift.
///
/// # JSON Example
///
/// ```json
/// {
///   "payment_method": "credit_card",
///   "idempotency_key": "9b0f6a1e-buy-001",
///   "payer": { "name": "Ana Souza", "email": "ana@example.com", "tax_id": "12345678909" },
///   "card_token": "encrypted-card-blob",
///   "installments": 1
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub payment_method: String,
    pub idempotency_key: String,
    pub payer: Payer,

    /// Encrypted card from the gateway's client-side SDK (credit card only)
    pub card_token: Option<String>,

    /// Number of installments (credit card only, defaults to 1)
    pub installments: Option<u32>,
}

/// Response returned after a purchase attempt is accepted.
///
/// `qr_code` and `qr_code_text` are only present for PIX.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PurchaseResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_text: Option<String>,
}

impl From<&Transaction> for PurchaseResponse {
    fn from(transaction: &Transaction) -> Self {
        let qr = transaction.pix_qr_code();
        Self {
            transaction_id: transaction.internal_id.clone(),
            status: transaction.status,
            payment_method: transaction.payment_method,
            qr_code: qr.as_ref().and_then(|q| q.image_base64.clone()),
            qr_code_text: qr.map(|q| q.text),
        }
    }
}

/// Response for `GET /api/v1/transactions/{internal_id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub gross_amount: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionStatusResponse {
    fn from(transaction: Transaction) -> Self {
        let qr = transaction.pix_qr_code();
        Self {
            transaction_id: transaction.internal_id,
            status: transaction.status,
            payment_method: transaction.payment_method,
            gross_amount: transaction.gross_amount,
            error_message: transaction.error_message,
            qr_code: qr.as_ref().and_then(|q| q.image_base64.clone()),
            qr_code_text: qr.map(|q| q.text),
            confirmed_at: transaction.confirmed_at,
        }
    }
}
