//! Payment service - charge creation for gift purchases.
//!
//! This service handles:
//! - Idempotent charge creation (one gateway charge per idempotency key)
//! - Fee calculation and snapshotting onto the transaction
//! - Recording the gateway's synchronous answer
//!
//! # What it never does
//!
//! Stock is not touched here. A unit moves from available to sold only when
//! the confirmation webhook arrives (see `webhook_service`), so pending and
//! failed payments never consume inventory.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{
    fee_calculator::{self, FeeRate},
    idempotency_service::IdempotencyService,
};
use crate::{
    error::AppError,
    gateway::{
        PaymentGateway, PaymentGatewayError,
        types::{
            Amount, CardPaymentMethod, CreditCardChargeRequest, Customer, EncryptedCard,
            OrderItem, PixOrderRequest, QrCodeAmount, QrCodeRequest,
        },
    },
    models::{
        gift_item::GiftItem,
        idempotency_key::NewIdempotencyKey,
        registry_config::FeeModality,
        transaction::{
            NewTransaction, Payer, PaymentMethod, PixQrCode, PurchaseRequest, PurchaseResponse,
            QR_CODE_IMAGE_KEY, Transaction, TransactionStatus, generate_internal_id,
        },
    },
    store::{GatewayResult, InsertOutcome, PaymentStore},
};

/// Fee applied when a wedding has never saved registry settings.
pub const DEFAULT_FEE_BASIS_POINTS: i32 = 500;
pub const DEFAULT_FEE_MODALITY: FeeModality = FeeModality::CouplePays;

/// Deployment-level settings for outgoing charges.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// ISO 4217 code sent with card charges
    pub currency: String,

    /// Where the gateway should deliver webhooks
    pub notification_url: Option<String>,

    /// Lifetime of a PIX QR code
    pub pix_expiration: Duration,
}

/// Payment details supplied with a purchase.
#[derive(Debug, Clone)]
pub struct PaymentData {
    pub payer: Payer,

    /// Encrypted card (credit card only)
    pub card_token: Option<String>,

    pub installments: u32,
}

/// Outcome of a PIX purchase: the transaction plus the code to pay it.
#[derive(Debug, Clone)]
pub struct PixPayment {
    pub transaction: Transaction,
    pub qr_code: Option<PixQrCode>,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    idempotency: IdempotencyService,
    settings: Arc<PaymentSettings>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            idempotency: IdempotencyService::new(store.clone()),
            store,
            gateway,
            settings: Arc::new(settings),
        }
    }

    /// Dispatch a purchase request to the card or PIX flow.
    pub async fn purchase(
        &self,
        gift: &GiftItem,
        request: PurchaseRequest,
    ) -> Result<PurchaseResponse, AppError> {
        let method = parse_payment_method(&request.payment_method)?;

        match method {
            PaymentMethod::CreditCard => {
                let card_token = request.card_token.unwrap_or_default();
                let transaction = self
                    .process_credit_card_payment(
                        gift,
                        request.payer,
                        &card_token,
                        request.installments.unwrap_or(1),
                        &request.idempotency_key,
                    )
                    .await?;
                Ok(PurchaseResponse::from(&transaction))
            }
            PaymentMethod::Pix => {
                let payment = self
                    .process_pix_payment(gift, request.payer, &request.idempotency_key)
                    .await?;
                Ok(PurchaseResponse::from(&payment.transaction))
            }
        }
    }

    /// Charge a card for one unit of `gift`.
    pub async fn process_credit_card_payment(
        &self,
        gift: &GiftItem,
        payer: Payer,
        card_token: &str,
        installments: u32,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        ensure_available(gift)?;

        let data = PaymentData {
            payer,
            card_token: Some(card_token.to_string()),
            installments: installments.max(1),
        };
        self.create_charge(gift, PaymentMethod::CreditCard.as_str(), data, idempotency_key)
            .await
    }

    /// Open a PIX order for one unit of `gift` and return its QR code.
    pub async fn process_pix_payment(
        &self,
        gift: &GiftItem,
        payer: Payer,
        idempotency_key: &str,
    ) -> Result<PixPayment, AppError> {
        ensure_available(gift)?;

        let data = PaymentData {
            payer,
            card_token: None,
            installments: 1,
        };
        let transaction = self
            .create_charge(gift, PaymentMethod::Pix.as_str(), data, idempotency_key)
            .await?;

        Ok(PixPayment {
            qr_code: transaction.pix_qr_code(),
            transaction,
        })
    }

    /// Create (or replay) the charge for one gift item.
    ///
    /// # Process
    ///
    /// 1. Validate the idempotency key format
    /// 2. Replay: a known key returns its transaction, the gateway is not called
    /// 3. Validate the payment method and its data
    /// 4. Compute amounts from the wedding's current fee settings
    /// 5. Re-check the key and insert a pending transaction atomically
    /// 6. Call the gateway after commit and record its answer
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: bad key, unknown method, missing card token
    /// - `Gateway`: the provider refused; the transaction is marked failed
    ///   and a retry with the same key returns that failed transaction
    pub async fn create_charge(
        &self,
        gift: &GiftItem,
        payment_method: &str,
        payment_data: PaymentData,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        if !IdempotencyService::is_valid_key_format(idempotency_key) {
            return Err(AppError::InvalidArgument(
                "Idempotency key must be between 1 and 100 characters".to_string(),
            ));
        }

        if let Some(existing) = self.idempotency.get_transaction(idempotency_key).await? {
            tracing::info!(
                transaction_id = %existing.internal_id,
                "idempotent replay, returning existing transaction"
            );
            return Ok(existing);
        }

        let method = parse_payment_method(payment_method)?;
        if method == PaymentMethod::CreditCard
            && payment_data
                .card_token
                .as_deref()
                .is_none_or(|t| t.trim().is_empty())
        {
            return Err(AppError::InvalidArgument(
                "card_token is required for credit card payments".to_string(),
            ));
        }

        let (modality, basis_points) = match self.store.find_registry_config(gift.wedding_id).await? {
            Some(config) => (config.fee_modality, config.fee_basis_points),
            None => (DEFAULT_FEE_MODALITY, DEFAULT_FEE_BASIS_POINTS),
        };
        let rate = FeeRate::from_basis_points(basis_points)?;
        let amounts = fee_calculator::calculate(gift.price, rate, modality)?;

        let new_transaction = NewTransaction {
            internal_id: generate_internal_id(),
            wedding_id: gift.wedding_id,
            gift_item_id: gift.id,
            original_unit_price: gift.price,
            fee_basis_points: rate.basis_points(),
            fee_modality: modality,
            amounts,
            payment_method: method,
        };
        // Creation-time placeholder, replaced once the gateway has answered.
        let response = serde_json::to_value(PurchaseResponse {
            transaction_id: new_transaction.internal_id.clone(),
            status: TransactionStatus::Pending,
            payment_method: method,
            qr_code: None,
            qr_code_text: None,
        })?;

        let now = Utc::now();
        let transaction = match self
            .store
            .insert_pending_transaction(
                new_transaction,
                NewIdempotencyKey::new(idempotency_key, response, now),
                now,
            )
            .await?
        {
            InsertOutcome::Created(transaction) => transaction,
            InsertOutcome::Existing(existing) => {
                tracing::info!(
                    transaction_id = %existing.internal_id,
                    "concurrent request already created this transaction"
                );
                return Ok(existing);
            }
        };

        tracing::info!(
            transaction_id = %transaction.internal_id,
            gift_item_id = %gift.id,
            payment_method = %method,
            gross_amount = transaction.gross_amount,
            "pending transaction created"
        );

        let result = match method {
            PaymentMethod::CreditCard => self.charge_card(gift, &transaction, &payment_data).await,
            PaymentMethod::Pix => self.open_pix_order(gift, &transaction, &payment_data).await,
        };

        match result {
            Ok(result) => {
                let updated = self.store.record_gateway_result(transaction.id, result).await?;
                tracing::info!(
                    transaction_id = %updated.internal_id,
                    gateway_id = ?updated.gateway_transaction_id,
                    status = %updated.status,
                    "gateway accepted charge"
                );
                self.remember_response(idempotency_key, &updated).await;
                Ok(updated)
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction.internal_id,
                    status_code = ?e.status_code(),
                    error = %e,
                    "gateway charge failed"
                );
                // The gateway error is what the caller needs, even if recording it fails.
                match self.store.mark_failed(transaction.id, &e.to_string()).await {
                    Ok(failed) => self.remember_response(idempotency_key, &failed).await,
                    Err(store_err) => tracing::error!(
                        transaction_id = %transaction.internal_id,
                        error = %store_err,
                        "could not mark transaction failed"
                    ),
                }
                Err(AppError::Gateway(e))
            }
        }
    }

    /// Store the response the client actually got under its idempotency key.
    ///
    /// The transaction row is authoritative, so a failure here is only logged.
    async fn remember_response(&self, idempotency_key: &str, transaction: &Transaction) {
        let recorded = match serde_json::to_value(PurchaseResponse::from(transaction)) {
            Ok(response) => self.idempotency.record_response(idempotency_key, response).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = recorded {
            tracing::warn!(
                transaction_id = %transaction.internal_id,
                error = %e,
                "could not record idempotent response"
            );
        }
    }

    /// Pull the latest status of a pending card charge from the gateway.
    ///
    /// Confirmation and stock still wait for the webhook; this only updates
    /// the recorded status and response.
    pub async fn refresh_from_gateway(&self, internal_id: &str) -> Result<Transaction, AppError> {
        let transaction = self.find_transaction(internal_id).await?;

        let gateway_id = match &transaction.gateway_transaction_id {
            Some(id)
                if transaction.status == TransactionStatus::Pending
                    && transaction.payment_method == PaymentMethod::CreditCard =>
            {
                id.clone()
            }
            _ => return Ok(transaction),
        };

        match self.gateway.get_transaction(&gateway_id).await {
            Ok(charge) => {
                let result = GatewayResult {
                    gateway_transaction_id: charge.id,
                    status: charge.status.transaction_status(),
                    error_message: charge.message,
                    response: charge.raw,
                };
                self.store.record_gateway_result(transaction.id, result).await
            }
            Err(e) => {
                tracing::warn!(
                    transaction_id = %transaction.internal_id,
                    error = %e,
                    "could not refresh charge status"
                );
                Ok(transaction)
            }
        }
    }

    async fn charge_card(
        &self,
        gift: &GiftItem,
        transaction: &Transaction,
        data: &PaymentData,
    ) -> Result<GatewayResult, PaymentGatewayError> {
        let request = CreditCardChargeRequest {
            reference_id: transaction.internal_id.clone(),
            description: gift.name.clone(),
            amount: Amount {
                value: transaction.gross_amount,
                currency: self.settings.currency.clone(),
            },
            payment_method: CardPaymentMethod {
                method_type: "CREDIT_CARD".to_string(),
                installments: data.installments,
                capture: true,
                card: EncryptedCard {
                    encrypted: data.card_token.clone().unwrap_or_default(),
                },
            },
            customer: customer(&data.payer),
            notification_urls: self.notification_urls(),
        };

        let charge = self.gateway.create_credit_card_charge(&request).await?;
        Ok(GatewayResult {
            gateway_transaction_id: charge.id,
            status: charge.status.transaction_status(),
            error_message: charge.message,
            response: charge.raw,
        })
    }

    async fn open_pix_order(
        &self,
        gift: &GiftItem,
        transaction: &Transaction,
        data: &PaymentData,
    ) -> Result<GatewayResult, PaymentGatewayError> {
        let request = PixOrderRequest {
            reference_id: transaction.internal_id.clone(),
            customer: customer(&data.payer),
            items: vec![OrderItem {
                reference_id: gift.id.to_string(),
                name: gift.name.clone(),
                quantity: 1,
                unit_amount: transaction.gross_amount,
            }],
            qr_codes: vec![QrCodeRequest {
                amount: QrCodeAmount {
                    value: transaction.gross_amount,
                },
                expiration_date: Utc::now() + self.settings.pix_expiration,
            }],
            notification_urls: self.notification_urls(),
        };

        let order = self.gateway.create_pix_order(&request).await?;

        let mut response = order.raw;
        if let (Some(image), Some(map)) = (order.qr_code_base64, response.as_object_mut()) {
            map.insert(QR_CODE_IMAGE_KEY.to_string(), Value::String(image));
        }

        Ok(GatewayResult {
            gateway_transaction_id: order.transaction_id,
            status: TransactionStatus::Pending,
            error_message: None,
            response,
        })
    }

    fn notification_urls(&self) -> Vec<String> {
        self.settings.notification_url.iter().cloned().collect()
    }

    pub async fn find_transaction(&self, internal_id: &str) -> Result<Transaction, AppError> {
        self.store
            .find_transaction_by_internal_id(internal_id)
            .await?
            .ok_or(AppError::NotFound("Transaction"))
    }

    /// Load a gift item or fail with `NotFound`.
    pub async fn gift_item(&self, id: Uuid) -> Result<GiftItem, AppError> {
        self.store
            .find_gift_item(id)
            .await?
            .ok_or(AppError::NotFound("Gift item"))
    }
}

fn ensure_available(gift: &GiftItem) -> Result<(), AppError> {
    if gift.is_available() {
        Ok(())
    } else {
        Err(AppError::Unavailable(
            "This gift is not available for purchase".to_string(),
        ))
    }
}

fn parse_payment_method(method: &str) -> Result<PaymentMethod, AppError> {
    method
        .parse()
        .map_err(|_| AppError::InvalidArgument(format!("Unsupported payment method: {method}")))
}

fn customer(payer: &Payer) -> Customer {
    Customer {
        name: payer.name.clone(),
        email: payer.email.clone(),
        tax_id: payer.tax_id.clone(),
    }
}
