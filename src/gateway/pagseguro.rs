//! PagSeguro HTTP client.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::Value;

use super::{
    PaymentGateway, PaymentGatewayError, signature,
    types::{CreditCardChargeRequest, GatewayCharge, PixOrder, PixOrderRequest},
};

/// Connection settings for the PagSeguro API.
#[derive(Debug, Clone)]
pub struct PagSeguroConfig {
    /// Base URL without trailing slash, e.g. `https://sandbox.api.pagseguro.com`
    pub api_url: String,

    /// Bearer token
    pub token: String,

    /// Shared secret for webhook signatures; `None` rejects every webhook
    pub webhook_secret: Option<String>,

    pub timeout: Duration,
}

/// PagSeguro API client.
#[derive(Clone)]
pub struct PagSeguroClient {
    config: Arc<PagSeguroConfig>,
    http_client: Client,
}

impl PagSeguroClient {
    pub fn new(mut config: PagSeguroConfig) -> Result<Self, PaymentGatewayError> {
        if config.token.is_empty() {
            return Err(PaymentGatewayError::Configuration(
                "PagSeguro token is empty".to_string(),
            ));
        }
        config.api_url = config.api_url.trim_end_matches('/').to_string();

        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentGatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    pub fn config(&self) -> &PagSeguroConfig {
        &self.config
    }

    async fn get(&self, path: &str) -> Result<Value, PaymentGatewayError> {
        let url = format!("{}{}", self.config.api_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, PaymentGatewayError> {
        let url = format!("{}{}", self.config.api_url, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, PaymentGatewayError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<Value>()
                .await
                .map_err(|e| PaymentGatewayError::MalformedResponse(e.to_string()))
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            Err(PaymentGatewayError::Api {
                status_code: status.as_u16(),
                message: error_message(&body),
            })
        }
    }

    /// Download the QR image and base64 it.
    async fn fetch_qr_image(&self, url: &str) -> Result<String, PaymentGatewayError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentGatewayError::Api {
                status_code: status.as_u16(),
                message: "QR code image unavailable".to_string(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(STANDARD.encode(bytes))
    }
}

#[async_trait]
impl PaymentGateway for PagSeguroClient {
    async fn create_credit_card_charge(
        &self,
        request: &CreditCardChargeRequest,
    ) -> Result<GatewayCharge, PaymentGatewayError> {
        tracing::info!(reference_id = %request.reference_id, "creating PagSeguro card charge");
        let raw = self.post("/charges", request).await?;
        GatewayCharge::from_response(raw)
    }

    async fn create_pix_order(
        &self,
        request: &PixOrderRequest,
    ) -> Result<PixOrder, PaymentGatewayError> {
        tracing::info!(reference_id = %request.reference_id, "creating PagSeguro PIX order");
        let raw = self.post("/orders", request).await?;
        let mut order = PixOrder::from_response(raw)?;

        // The order already exists at the gateway; a missing image must not fail it.
        if let Some(url) = order.qr_image_url().map(str::to_string) {
            match self.fetch_qr_image(&url).await {
                Ok(image) => order.qr_code_base64 = Some(image),
                Err(e) => tracing::warn!(
                    order_id = %order.transaction_id,
                    error = %e,
                    "could not fetch PIX QR image"
                ),
            }
        }

        Ok(order)
    }

    async fn get_transaction(&self, id: &str) -> Result<GatewayCharge, PaymentGatewayError> {
        let raw = self.get(&format!("/charges/{id}")).await?;
        GatewayCharge::from_response(raw)
    }

    fn validate_signature(&self, payload: &[u8], signature: &str) -> bool {
        signature::verify(self.config.webhook_secret.as_deref(), payload, signature)
    }
}

/// Human-readable message from a PagSeguro error body.
///
/// PagSeguro answers `{"error_messages": [{"code", "description", ...}]}`;
/// anything else is passed through as-is.
fn error_message(body: &str) -> String {
    let descriptions: Vec<String> = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error_messages").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|m| {
            let description = m.get("description").and_then(Value::as_str)?;
            Some(match m.get("parameter_name").and_then(Value::as_str) {
                Some(param) => format!("{description} ({param})"),
                None => description.to_string(),
            })
        })
        .collect();

    if descriptions.is_empty() {
        body.to_string()
    } else {
        descriptions.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_joins_gateway_descriptions() {
        let body = r#"{"error_messages":[
            {"code":"40002","description":"invalid_parameter","parameter_name":"customer.tax_id"},
            {"code":"40001","description":"required_parameter"}
        ]}"#;
        assert_eq!(
            error_message(body),
            "invalid_parameter (customer.tax_id); required_parameter"
        );
    }

    #[test]
    fn error_message_passes_through_unknown_bodies() {
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn empty_token_is_a_configuration_error() {
        let err = PagSeguroClient::new(PagSeguroConfig {
            api_url: "https://sandbox.api.pagseguro.com".to_string(),
            token: String::new(),
            webhook_secret: None,
            timeout: Duration::from_secs(5),
        })
        .err()
        .unwrap();
        assert!(matches!(err, PaymentGatewayError::Configuration(_)));
    }
}
