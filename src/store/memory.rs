//! In-process `PaymentStore`.
//!
//! A single async mutex guards all state, so every trait method is atomic
//! the same way its PostgreSQL counterpart is. Used by the test suites and
//! for running the service without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ConfirmOutcome, FailOutcome, GatewayResult, InsertOutcome, PaymentStore,
    merge_gateway_response, merge_webhook_payload,
};
use crate::{
    error::AppError,
    models::{
        gift_item::GiftItem,
        idempotency_key::{IdempotencyKey, NewIdempotencyKey},
        registry_config::GiftRegistryConfig,
        transaction::{NewTransaction, Transaction, TransactionStatus},
    },
};

#[derive(Default)]
struct State {
    gift_items: HashMap<Uuid, GiftItem>,
    configs: HashMap<Uuid, GiftRegistryConfig>,
    transactions: HashMap<Uuid, Transaction>,
    keys: HashMap<String, IdempotencyKey>,
}

impl State {
    fn live_key(&self, key: &str, now: DateTime<Utc>) -> Option<&IdempotencyKey> {
        self.keys.get(key).filter(|k| !k.is_expired(now))
    }
}

#[derive(Default)]
pub struct MemoryPaymentStore {
    state: Mutex<State>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_gift_item(&self, item: GiftItem) {
        self.state.lock().await.gift_items.insert(item.id, item);
    }

    pub async fn upsert_registry_config(&self, config: GiftRegistryConfig) {
        self.state
            .lock()
            .await
            .configs
            .insert(config.wedding_id, config);
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        let mut all: Vec<Transaction> =
            self.state.lock().await.transactions.values().cloned().collect();
        all.sort_by_key(|t| t.created_at);
        all
    }

    pub async fn idempotency_key_count(&self) -> usize {
        self.state.lock().await.keys.len()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_gift_item(&self, id: Uuid) -> Result<Option<GiftItem>, AppError> {
        Ok(self.state.lock().await.gift_items.get(&id).cloned())
    }

    async fn find_registry_config(
        &self,
        wedding_id: Uuid,
    ) -> Result<Option<GiftRegistryConfig>, AppError> {
        Ok(self.state.lock().await.configs.get(&wedding_id).cloned())
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_internal_id(
        &self,
        internal_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .find(|t| t.internal_id == internal_id)
            .cloned())
    }

    async fn find_transaction_by_gateway_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .find(|t| t.gateway_transaction_id.as_deref() == Some(gateway_transaction_id))
            .cloned())
    }

    async fn find_idempotency_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyKey>, AppError> {
        Ok(self.state.lock().await.live_key(key, now).cloned())
    }

    async fn store_idempotency_key(
        &self,
        transaction_id: Uuid,
        key: NewIdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyKey, AppError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.live_key(&key.key, now) {
            return Ok(existing.clone());
        }

        let record = IdempotencyKey {
            id: Uuid::new_v4(),
            key: key.key.clone(),
            transaction_id,
            response: key.response,
            expires_at: key.expires_at,
            created_at: now,
        };
        state.keys.insert(key.key, record.clone());
        Ok(record)
    }

    async fn record_idempotency_response(&self, key: &str, response: Value) -> Result<(), AppError> {
        if let Some(record) = self.state.lock().await.keys.get_mut(key) {
            record.response = response;
        }
        Ok(())
    }

    async fn delete_expired_idempotency_keys(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state.lock().await;
        let before = state.keys.len();
        state.keys.retain(|_, k| !k.is_expired(now));
        Ok((before - state.keys.len()) as u64)
    }

    async fn insert_pending_transaction(
        &self,
        transaction: NewTransaction,
        key: NewIdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, AppError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.live_key(&key.key, now) {
            let transaction = state
                .transactions
                .get(&existing.transaction_id)
                .cloned()
                .ok_or(AppError::NotFound("Transaction"))?;
            return Ok(InsertOutcome::Existing(transaction));
        }

        let created = Transaction {
            id: Uuid::new_v4(),
            internal_id: transaction.internal_id,
            gateway_transaction_id: None,
            wedding_id: transaction.wedding_id,
            gift_item_id: transaction.gift_item_id,
            original_unit_price: transaction.original_unit_price,
            fee_basis_points: transaction.fee_basis_points,
            fee_modality: transaction.fee_modality,
            fee_amount: transaction.amounts.fee_amount,
            gross_amount: transaction.amounts.gross_amount,
            net_amount_couple: transaction.amounts.net_amount_couple,
            platform_amount: transaction.amounts.platform_amount,
            payment_method: transaction.payment_method,
            status: TransactionStatus::Pending,
            error_message: None,
            gateway_response: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        };

        state.keys.insert(
            key.key.clone(),
            IdempotencyKey {
                id: Uuid::new_v4(),
                key: key.key,
                transaction_id: created.id,
                response: key.response,
                expires_at: key.expires_at,
                created_at: now,
            },
        );
        state.transactions.insert(created.id, created.clone());

        Ok(InsertOutcome::Created(created))
    }

    async fn record_gateway_result(
        &self,
        id: Uuid,
        result: GatewayResult,
    ) -> Result<Transaction, AppError> {
        let mut state = self.state.lock().await;
        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or(AppError::NotFound("Transaction"))?;

        if transaction.gateway_transaction_id.is_none() {
            transaction.gateway_transaction_id = Some(result.gateway_transaction_id);
        }
        transaction.gateway_response = Some(merge_gateway_response(
            transaction.gateway_response.take(),
            result.response,
        ));
        if transaction.status == TransactionStatus::Pending && transaction.confirmed_at.is_none() {
            transaction.status = result.status;
            if result.status == TransactionStatus::Failed {
                transaction.error_message = result.error_message;
            }
        }
        transaction.updated_at = Utc::now();

        Ok(transaction.clone())
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<Transaction, AppError> {
        let mut state = self.state.lock().await;
        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or(AppError::NotFound("Transaction"))?;

        if transaction.status == TransactionStatus::Pending && transaction.confirmed_at.is_none() {
            transaction.status = TransactionStatus::Failed;
            transaction.error_message = Some(message.to_string());
            transaction.updated_at = Utc::now();
        }

        Ok(transaction.clone())
    }

    async fn confirm_and_decrement(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, AppError> {
        let mut state = self.state.lock().await;

        let Some(transaction) = state.transactions.get_mut(&id) else {
            return Ok(ConfirmOutcome::NotFound);
        };
        if transaction.is_confirmed() {
            return Ok(ConfirmOutcome::AlreadyConfirmed(transaction.clone()));
        }
        if matches!(
            transaction.status,
            TransactionStatus::Failed | TransactionStatus::Refunded
        ) {
            return Ok(ConfirmOutcome::Terminal(transaction.clone()));
        }

        transaction.status = TransactionStatus::Confirmed;
        transaction.confirmed_at = Some(now);
        if transaction.gateway_transaction_id.is_none() {
            transaction.gateway_transaction_id = Some(gateway_transaction_id.to_string());
        }
        transaction.gateway_response = Some(merge_webhook_payload(
            transaction.gateway_response.take(),
            payload,
        ));
        transaction.error_message = None;
        transaction.updated_at = now;
        let confirmed = transaction.clone();

        let inventory_moved = match state.gift_items.get_mut(&confirmed.gift_item_id) {
            Some(item) if item.quantity_available > 0 => {
                item.quantity_available -= 1;
                item.quantity_sold += 1;
                item.updated_at = now;
                true
            }
            _ => false,
        };

        Ok(ConfirmOutcome::Confirmed {
            transaction: confirmed,
            inventory_moved,
        })
    }

    async fn fail_from_webhook(
        &self,
        id: Uuid,
        message: &str,
        payload: Value,
    ) -> Result<FailOutcome, AppError> {
        let mut state = self.state.lock().await;

        let Some(transaction) = state.transactions.get_mut(&id) else {
            return Ok(FailOutcome::NotFound);
        };
        if transaction.status != TransactionStatus::Pending || transaction.confirmed_at.is_some() {
            return Ok(FailOutcome::AlreadySettled(transaction.clone()));
        }

        transaction.status = TransactionStatus::Failed;
        transaction.error_message = Some(message.to_string());
        transaction.gateway_response = Some(merge_webhook_payload(
            transaction.gateway_response.take(),
            payload,
        ));
        transaction.updated_at = Utc::now();

        Ok(FailOutcome::Failed(transaction.clone()))
    }
}
