use std::time::Duration;

use chrono::Utc;
use gift_registry_payments::{
    gateway::{
        PagSeguroClient, PagSeguroConfig, PaymentGateway, PaymentGatewayError, signature,
        types::{
            Amount, CardPaymentMethod, ChargeStatus, CreditCardChargeRequest, Customer,
            EncryptedCard, OrderItem, PixOrderRequest, QrCodeAmount, QrCodeRequest,
        },
    },
    models::transaction::TransactionStatus,
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> PagSeguroClient {
    PagSeguroClient::new(PagSeguroConfig {
        api_url: format!("{}/", server.uri()),
        token: TOKEN.to_string(),
        webhook_secret: Some("whsec".to_string()),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn customer() -> Customer {
    Customer {
        name: "Ana Souza".to_string(),
        email: "ana@example.com".to_string(),
        tax_id: "12345678909".to_string(),
    }
}

fn card_request() -> CreditCardChargeRequest {
    CreditCardChargeRequest {
        reference_id: "TXN-ABC".to_string(),
        description: "Jogo de panelas".to_string(),
        amount: Amount {
            value: 52_632,
            currency: "BRL".to_string(),
        },
        payment_method: CardPaymentMethod {
            method_type: "CREDIT_CARD".to_string(),
            installments: 1,
            capture: true,
            card: EncryptedCard {
                encrypted: "enc_card".to_string(),
            },
        },
        customer: customer(),
        notification_urls: vec![],
    }
}

fn pix_request() -> PixOrderRequest {
    PixOrderRequest {
        reference_id: "TXN-PIX".to_string(),
        customer: customer(),
        items: vec![OrderItem {
            reference_id: "gift-1".to_string(),
            name: "Jogo de panelas".to_string(),
            quantity: 1,
            unit_amount: 50_000,
        }],
        qr_codes: vec![QrCodeRequest {
            amount: QrCodeAmount { value: 50_000 },
            expiration_date: Utc::now() + chrono::Duration::minutes(30),
        }],
        notification_urls: vec!["https://registry.example.com/webhooks/pagseguro".to_string()],
    }
}

#[tokio::test]
async fn card_charge_posts_to_charges() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/charges"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(json!({
            "reference_id": "TXN-ABC",
            "amount": { "value": 52632, "currency": "BRL" },
            "payment_method": { "type": "CREDIT_CARD", "capture": true }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "CHAR_123",
            "reference_id": "TXN-ABC",
            "status": "AUTHORIZED",
            "payment_response": { "code": "20000", "message": "SUCESSO" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let charge = client(&server)
        .create_credit_card_charge(&card_request())
        .await
        .unwrap();

    assert_eq!(charge.id, "CHAR_123");
    assert_eq!(charge.status, ChargeStatus::Authorized);
    assert_eq!(charge.status.transaction_status(), TransactionStatus::Confirmed);
}

#[tokio::test]
async fn api_errors_carry_status_and_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/charges"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_messages": [{
                "code": "40002",
                "description": "invalid_parameter",
                "parameter_name": "payment_method.card.encrypted"
            }]
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_credit_card_charge(&card_request())
        .await
        .unwrap_err();

    match err {
        PaymentGatewayError::Api {
            status_code,
            message,
        } => {
            assert_eq!(status_code, 400);
            assert_eq!(message, "invalid_parameter (payment_method.card.encrypted)");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn pix_order_includes_qr_image() {
    let server = MockServer::start().await;
    let image_url = format!("{}/qrcode/QRCO_1/png", server.uri());

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_partial_json(json!({ "reference_id": "TXN-PIX" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ORDE_9",
            "reference_id": "TXN-PIX",
            "qr_codes": [{
                "id": "QRCO_1",
                "text": "00020101021226830014br.gov.bcb.pix",
                "expiration_date": "2026-10-19T12:30:00-03:00",
                "links": [
                    { "rel": "QRCODE.PNG", "href": image_url },
                    { "rel": "QRCODE.BASE64", "href": "https://example.invalid/base64" }
                ]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/qrcode/QRCO_1/png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
        .mount(&server)
        .await;

    let order = client(&server).create_pix_order(&pix_request()).await.unwrap();

    assert_eq!(order.transaction_id, "ORDE_9");
    assert_eq!(order.qr_code_text, "00020101021226830014br.gov.bcb.pix");
    assert_eq!(order.qr_code_base64.as_deref(), Some("UE5H"));
    assert_eq!(order.expires_at.as_deref(), Some("2026-10-19T12:30:00-03:00"));
}

#[tokio::test]
async fn pix_order_survives_missing_qr_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ORDE_10",
            "qr_codes": [{
                "text": "000201pix",
                "links": [{ "rel": "QRCODE.PNG", "href": format!("{}/qrcode/gone", server.uri()) }]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/qrcode/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let order = client(&server).create_pix_order(&pix_request()).await.unwrap();

    assert_eq!(order.transaction_id, "ORDE_10");
    assert!(order.qr_code_base64.is_none());
}

#[tokio::test]
async fn pix_order_without_qr_code_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "ORDE_11", "qr_codes": [] })))
        .mount(&server)
        .await;

    let err = client(&server).create_pix_order(&pix_request()).await.unwrap_err();

    assert!(matches!(err, PaymentGatewayError::MissingQrCode));
}

#[tokio::test]
async fn charge_lookup_reads_current_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/charges/CHAR_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "CHAR_123",
            "status": "DECLINED",
            "payment_response": { "code": "10002", "message": "NAO AUTORIZADO" }
        })))
        .mount(&server)
        .await;

    let charge = client(&server).get_transaction("CHAR_123").await.unwrap();

    assert_eq!(charge.status, ChargeStatus::Declined);
    assert_eq!(charge.message.as_deref(), Some("NAO AUTORIZADO"));
}

#[tokio::test]
async fn malformed_success_body_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/charges/CHAR_X"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).get_transaction("CHAR_X").await.unwrap_err();

    assert!(matches!(err, PaymentGatewayError::MalformedResponse(_)));
}

#[tokio::test]
async fn webhook_signatures_use_configured_secret() {
    let server = MockServer::start().await;
    let client = client(&server);
    let body = br#"{"event_type":"CHARGE.PAID","data":{"id":"CHAR_1"}}"#;

    assert!(client.validate_signature(body, &signature::sign("whsec", body)));
    assert!(!client.validate_signature(body, &signature::sign("other", body)));
}
