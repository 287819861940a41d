//! Inbound PagSeguro webhook processing.
//!
//! # Flow
//!
//! 1. Verify the HMAC signature over the raw body (before any parsing)
//! 2. Read `event_type`; unhandled types are logged and ignored
//! 3. `CHARGE.PAID` / `CHARGE.AUTHORIZED`: confirm and move one unit of stock
//! 4. `CHARGE.DECLINED` / `CHARGE.CANCELED`: mark failed, stock untouched
//!
//! Delivery is at-least-once. A repeated confirmation is a no-op, and a
//! notification for an unknown charge is acknowledged so the gateway stops
//! redelivering it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::{
    error::AppError,
    gateway::PaymentGateway,
    models::{
        transaction::Transaction,
        webhook::{EventAction, WebhookEvent},
    },
    store::{ConfirmOutcome, FailOutcome, PaymentStore},
};

/// What a delivery ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Confirmed(Transaction),
    AlreadyProcessed,
    Failed(Transaction),
    /// The transaction had already settled; the event changed nothing.
    Skipped,
    TransactionNotFound,
    Ignored,
}

#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl WebhookService {
    pub fn new(store: Arc<dyn PaymentStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Handle one webhook delivery.
    ///
    /// # Errors
    ///
    /// - `InvalidWebhook`: missing/bad signature or unparseable body. Nothing
    ///   is processed.
    /// - Anything raised while applying a recognised event is logged and
    ///   returned so the gateway retries the delivery later.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        let valid = signature.is_some_and(|s| self.gateway.validate_signature(raw_body, s));
        if !valid {
            tracing::warn!("rejected webhook with invalid signature");
            return Err(AppError::InvalidWebhook("Invalid signature".to_string()));
        }

        let payload: Value = serde_json::from_slice(raw_body)
            .map_err(|_| AppError::InvalidWebhook("Invalid JSON payload".to_string()))?;
        let event_type = payload
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidWebhook("Missing event_type".to_string()))?;

        // Unhandled types may carry any `data` shape; only known ones are typed.
        let action = EventAction::for_event_type(event_type);
        if action == EventAction::Ignore {
            tracing::info!(event_type, "ignoring unhandled webhook event");
            return Ok(WebhookOutcome::Ignored);
        }

        let event: WebhookEvent = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::InvalidWebhook(format!("Invalid webhook payload: {e}")))?;

        self.apply(&event, action, payload).await.inspect_err(|e| {
            tracing::error!(
                event_type = %event.event_type,
                gateway_id = %event.data.id,
                reference_id = ?event.data.reference_id,
                error = %e,
                "webhook processing failed"
            );
        })
    }

    async fn apply(
        &self,
        event: &WebhookEvent,
        action: EventAction,
        payload: Value,
    ) -> Result<WebhookOutcome, AppError> {
        let Some(transaction) = self.resolve(event).await? else {
            tracing::warn!(
                event_type = %event.event_type,
                gateway_id = %event.data.id,
                "webhook references unknown transaction"
            );
            return Ok(WebhookOutcome::TransactionNotFound);
        };

        match action {
            EventAction::Confirm => self.confirm(event, transaction, payload).await,
            EventAction::Fail => self.fail(event, transaction, payload).await,
            EventAction::Ignore => Ok(WebhookOutcome::Ignored),
        }
    }

    /// Look up by gateway id, then by our own reference.
    ///
    /// The reference covers a notification that beats the synchronous
    /// response recording the gateway id.
    async fn resolve(&self, event: &WebhookEvent) -> Result<Option<Transaction>, AppError> {
        if let Some(transaction) = self.store.find_transaction_by_gateway_id(&event.data.id).await? {
            return Ok(Some(transaction));
        }
        match &event.data.reference_id {
            Some(reference) => self.store.find_transaction_by_internal_id(reference).await,
            None => Ok(None),
        }
    }

    async fn confirm(
        &self,
        event: &WebhookEvent,
        transaction: Transaction,
        payload: Value,
    ) -> Result<WebhookOutcome, AppError> {
        if transaction.is_confirmed() {
            tracing::info!(
                transaction_id = %transaction.internal_id,
                "confirmation already processed"
            );
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = self
            .store
            .confirm_and_decrement(transaction.id, &event.data.id, payload, Utc::now())
            .await?;

        match outcome {
            ConfirmOutcome::Confirmed {
                transaction,
                inventory_moved,
            } => {
                if inventory_moved {
                    tracing::info!(
                        transaction_id = %transaction.internal_id,
                        gift_item_id = %transaction.gift_item_id,
                        "payment confirmed"
                    );
                } else {
                    tracing::warn!(
                        transaction_id = %transaction.internal_id,
                        gift_item_id = %transaction.gift_item_id,
                        "payment confirmed but gift has no stock left"
                    );
                }
                Ok(WebhookOutcome::Confirmed(transaction))
            }
            ConfirmOutcome::AlreadyConfirmed(_) => Ok(WebhookOutcome::AlreadyProcessed),
            ConfirmOutcome::Terminal(transaction) => {
                tracing::warn!(
                    transaction_id = %transaction.internal_id,
                    status = %transaction.status,
                    "payment confirmation for settled transaction ignored"
                );
                Ok(WebhookOutcome::Skipped)
            }
            ConfirmOutcome::NotFound => Ok(WebhookOutcome::TransactionNotFound),
        }
    }

    async fn fail(
        &self,
        event: &WebhookEvent,
        transaction: Transaction,
        payload: Value,
    ) -> Result<WebhookOutcome, AppError> {
        let message = event.failure_message();

        match self
            .store
            .fail_from_webhook(transaction.id, &message, payload)
            .await?
        {
            FailOutcome::Failed(transaction) => {
                tracing::info!(
                    transaction_id = %transaction.internal_id,
                    reason = %message,
                    "payment failed"
                );
                Ok(WebhookOutcome::Failed(transaction))
            }
            FailOutcome::AlreadySettled(transaction) => {
                tracing::info!(
                    transaction_id = %transaction.internal_id,
                    status = %transaction.status,
                    "failure notification for settled transaction ignored"
                );
                Ok(WebhookOutcome::Skipped)
            }
            FailOutcome::NotFound => Ok(WebhookOutcome::TransactionNotFound),
        }
    }
}
