//! Storage seam for the payment pipeline.
//!
//! Every method that must be atomic is a single trait method, so the
//! guarantee lives with the backend:
//! - `insert_pending_transaction` re-checks the idempotency key and writes the
//!   transaction plus key in one unit, serialised per key.
//! - `confirm_and_decrement` flips the status and moves one unit of stock in
//!   one unit, under a lock on the transaction row.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        gift_item::GiftItem,
        idempotency_key::{IdempotencyKey, NewIdempotencyKey},
        registry_config::GiftRegistryConfig,
        transaction::{NewTransaction, Transaction, TransactionStatus},
    },
};

pub use memory::MemoryPaymentStore;
pub use postgres::PgPaymentStore;

/// Result of the guarded insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// A new pending transaction was written with its key.
    Created(Transaction),
    /// Another request already holds the key; this is its transaction.
    Existing(Transaction),
}

/// Result of applying a confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Confirmed now. `inventory_moved` is false when no stock was left.
    Confirmed {
        transaction: Transaction,
        inventory_moved: bool,
    },
    /// A previous delivery already confirmed it.
    AlreadyConfirmed(Transaction),
    /// Failed or refunded; terminal states do not retransition.
    Terminal(Transaction),
    NotFound,
}

/// Result of applying a failure notification.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    Failed(Transaction),
    /// Already confirmed, failed or refunded.
    AlreadySettled(Transaction),
    NotFound,
}

/// Gateway answer recorded on a transaction after the charge call.
#[derive(Debug, Clone)]
pub struct GatewayResult {
    pub gateway_transaction_id: String,
    pub response: Value,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), AppError>;

    async fn find_gift_item(&self, id: Uuid) -> Result<Option<GiftItem>, AppError>;

    async fn find_registry_config(
        &self,
        wedding_id: Uuid,
    ) -> Result<Option<GiftRegistryConfig>, AppError>;

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError>;

    async fn find_transaction_by_internal_id(
        &self,
        internal_id: &str,
    ) -> Result<Option<Transaction>, AppError>;

    async fn find_transaction_by_gateway_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Transaction>, AppError>;

    /// Key record that has not expired at `now`.
    async fn find_idempotency_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyKey>, AppError>;

    /// Store a key for `transaction_id`. A live record for the same key wins
    /// over the new one and is returned instead.
    async fn store_idempotency_key(
        &self,
        transaction_id: Uuid,
        key: NewIdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyKey, AppError>;

    /// Replace the response remembered for `key`. Unknown keys are a no-op.
    async fn record_idempotency_response(&self, key: &str, response: Value) -> Result<(), AppError>;

    /// Delete every key expired at `now`, returning how many went.
    async fn delete_expired_idempotency_keys(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Re-check `key` and insert the pending transaction with it, atomically.
    async fn insert_pending_transaction(
        &self,
        transaction: NewTransaction,
        key: NewIdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, AppError>;

    /// Record the synchronous gateway answer. The status only changes while
    /// the transaction is still pending and unconfirmed.
    async fn record_gateway_result(
        &self,
        id: Uuid,
        result: GatewayResult,
    ) -> Result<Transaction, AppError>;

    /// Mark a pending transaction failed after the gateway call errored.
    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<Transaction, AppError>;

    /// Confirm the transaction and move one unit of its gift from available
    /// to sold, in one atomic unit.
    async fn confirm_and_decrement(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, AppError>;

    /// Fail a pending transaction from a decline notification. Stock is
    /// never touched.
    async fn fail_from_webhook(
        &self,
        id: Uuid,
        message: &str,
        payload: Value,
    ) -> Result<FailOutcome, AppError>;
}

/// Append a webhook payload to the stored gateway response.
///
/// Payloads accumulate under `webhooks` so the original charge response
/// stays intact.
pub fn merge_webhook_payload(existing: Option<Value>, payload: Value) -> Value {
    let mut response = match existing {
        Some(Value::Object(map)) => Value::Object(map),
        Some(other) => serde_json::json!({ "response": other }),
        None => serde_json::json!({}),
    };

    if let Some(map) = response.as_object_mut() {
        let entry = map
            .entry("webhooks")
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(events) => events.push(payload),
            other => *other = Value::Array(vec![payload]),
        }
    }

    response
}

/// Shallow merge of a gateway response into the stored one.
pub fn merge_gateway_response(existing: Option<Value>, response: Value) -> Value {
    match (existing, response) {
        (Some(Value::Object(mut stored)), Value::Object(incoming)) => {
            stored.extend(incoming);
            Value::Object(stored)
        }
        (_, response) => response,
    }
}
