//! Payment gateway boundary.
//!
//! `PaymentGateway` is what the payment and webhook services talk to.
//! `PagSeguroClient` is the HTTP implementation.

pub mod error;
pub mod pagseguro;
pub mod signature;
pub mod types;

use async_trait::async_trait;

pub use error::PaymentGatewayError;
pub use pagseguro::{PagSeguroClient, PagSeguroConfig};
pub use types::{CreditCardChargeRequest, GatewayCharge, PixOrder, PixOrderRequest};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create and capture a credit-card charge.
    async fn create_credit_card_charge(
        &self,
        request: &CreditCardChargeRequest,
    ) -> Result<GatewayCharge, PaymentGatewayError>;

    /// Create a PIX order and return its QR code.
    async fn create_pix_order(
        &self,
        request: &PixOrderRequest,
    ) -> Result<PixOrder, PaymentGatewayError>;

    /// Fetch the current state of a charge.
    async fn get_transaction(&self, id: &str) -> Result<GatewayCharge, PaymentGatewayError>;

    /// Check a webhook signature over the raw body. Never errors.
    fn validate_signature(&self, payload: &[u8], signature: &str) -> bool;
}
