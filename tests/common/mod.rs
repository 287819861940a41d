#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gift_registry_payments::{
    gateway::{
        CreditCardChargeRequest, GatewayCharge, PaymentGateway, PaymentGatewayError, PixOrder,
        PixOrderRequest, signature,
    },
    models::{
        gift_item::GiftItem,
        registry_config::{FeeModality, GiftRegistryConfig},
        transaction::Payer,
    },
    services::{
        payment_service::{PaymentService, PaymentSettings},
        webhook_service::WebhookService,
    },
    store::MemoryPaymentStore,
};
use serde_json::{Value, json};
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Scripted stand-in for PagSeguro.
pub struct FakeGateway {
    pub card_calls: AtomicUsize,
    pub pix_calls: AtomicUsize,
    pub lookups: AtomicUsize,
    next_id: AtomicUsize,
    charge_status: Mutex<String>,
    failure: Mutex<Option<(u16, String)>>,
    pub last_card_request: Mutex<Option<CreditCardChargeRequest>>,
    pub last_pix_request: Mutex<Option<PixOrderRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            card_calls: AtomicUsize::new(0),
            pix_calls: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            charge_status: Mutex::new("IN_ANALYSIS".to_string()),
            failure: Mutex::new(None),
            last_card_request: Mutex::new(None),
            last_pix_request: Mutex::new(None),
        }
    }

    pub fn answer_with_status(&self, status: &str) {
        *self.charge_status.lock().unwrap() = status.to_string();
    }

    pub fn fail_with(&self, status_code: u16, message: &str) {
        *self.failure.lock().unwrap() = Some((status_code, message.to_string()));
    }

    pub fn total_calls(&self) -> usize {
        self.card_calls.load(Ordering::SeqCst) + self.pix_calls.load(Ordering::SeqCst)
    }

    fn failure(&self) -> Option<PaymentGatewayError> {
        self.failure
            .lock()
            .unwrap()
            .clone()
            .map(|(status_code, message)| PaymentGatewayError::Api {
                status_code,
                message,
            })
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_credit_card_charge(
        &self,
        request: &CreditCardChargeRequest,
    ) -> Result<GatewayCharge, PaymentGatewayError> {
        self.card_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_card_request.lock().unwrap() = Some(request.clone());
        tokio::task::yield_now().await;
        if let Some(err) = self.failure() {
            return Err(err);
        }

        let status = self.charge_status.lock().unwrap().clone();
        GatewayCharge::from_response(json!({
            "id": self.next_id("CHAR"),
            "reference_id": request.reference_id,
            "status": status,
            "amount": { "value": request.amount.value, "currency": request.amount.currency },
            "payment_response": { "code": "20000", "message": "SUCESSO" }
        }))
    }

    async fn create_pix_order(
        &self,
        request: &PixOrderRequest,
    ) -> Result<PixOrder, PaymentGatewayError> {
        self.pix_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_pix_request.lock().unwrap() = Some(request.clone());
        tokio::task::yield_now().await;
        if let Some(err) = self.failure() {
            return Err(err);
        }

        let mut order = PixOrder::from_response(json!({
            "id": self.next_id("ORDE"),
            "reference_id": request.reference_id,
            "qr_codes": [{
                "id": "QRCO_1",
                "text": "00020101021226830014br.gov.bcb.pix2561api.pagseguro.com/pix/v2/1",
                "expiration_date": request.qr_codes[0].expiration_date,
                "links": [{ "rel": "QRCODE.PNG", "href": "https://api.pagseguro.com/qrcode/QRCO_1/png" }]
            }]
        }))?;
        order.qr_code_base64 = Some("iVBORw0KGgoAAAANSUhEUg==".to_string());
        Ok(order)
    }

    async fn get_transaction(&self, id: &str) -> Result<GatewayCharge, PaymentGatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure() {
            return Err(err);
        }
        let status = self.charge_status.lock().unwrap().clone();
        GatewayCharge::from_response(json!({ "id": id, "status": status }))
    }

    fn validate_signature(&self, payload: &[u8], signature: &str) -> bool {
        signature::verify(Some(WEBHOOK_SECRET), payload, signature)
    }
}

pub struct Harness {
    pub store: Arc<MemoryPaymentStore>,
    pub gateway: Arc<FakeGateway>,
    pub payments: PaymentService,
    pub webhooks: WebhookService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryPaymentStore::new());
        let gateway = Arc::new(FakeGateway::new());
        Self {
            payments: PaymentService::new(store.clone(), gateway.clone(), settings()),
            webhooks: WebhookService::new(store.clone(), gateway.clone()),
            store,
            gateway,
        }
    }

    /// Seed a wedding with fee settings and one gift.
    pub async fn seed_gift(
        &self,
        price: i64,
        quantity: i32,
        modality: FeeModality,
        fee_basis_points: i32,
    ) -> GiftItem {
        let wedding_id = Uuid::new_v4();
        self.store
            .upsert_registry_config(registry_config(wedding_id, modality, fee_basis_points))
            .await;
        let item = gift(wedding_id, price, quantity);
        self.store.insert_gift_item(item.clone()).await;
        item
    }

    pub async fn reload(&self, gift: &GiftItem) -> GiftItem {
        self.payments.gift_item(gift.id).await.unwrap()
    }
}

pub fn settings() -> PaymentSettings {
    PaymentSettings {
        currency: "BRL".to_string(),
        notification_url: Some("https://registry.example.com/webhooks/pagseguro".to_string()),
        pix_expiration: Duration::minutes(30),
    }
}

pub fn gift(wedding_id: Uuid, price: i64, quantity: i32) -> GiftItem {
    GiftItem {
        id: Uuid::new_v4(),
        wedding_id,
        name: "Jogo de panelas".to_string(),
        description: Some("Conjunto inox 5 pecas".to_string()),
        price,
        quantity_available: quantity,
        quantity_sold: 0,
        is_enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn registry_config(
    wedding_id: Uuid,
    fee_modality: FeeModality,
    fee_basis_points: i32,
) -> GiftRegistryConfig {
    GiftRegistryConfig {
        wedding_id,
        fee_modality,
        fee_basis_points,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn payer() -> Payer {
    Payer {
        name: "Ana Souza".to_string(),
        email: "ana@example.com".to_string(),
        tax_id: "12345678909".to_string(),
    }
}

pub fn event(event_type: &str, gateway_id: &str) -> Value {
    json!({
        "event_type": event_type,
        "data": { "id": gateway_id, "status": event_type.trim_start_matches("CHARGE.") }
    })
}

/// Serialised body and its valid signature.
pub fn signed(payload: &Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = signature::sign(WEBHOOK_SECRET, &body);
    (body, signature)
}
