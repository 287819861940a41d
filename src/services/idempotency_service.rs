//! Idempotency key service.
//!
//! Maps a client-supplied key to the transaction its first request created.
//! Lookups are not scoped to a wedding, so they behave the same from a
//! guest request and from an unauthenticated webhook.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::{
    error::AppError,
    models::{
        idempotency_key::{IdempotencyKey, MAX_KEY_LENGTH, NewIdempotencyKey},
        transaction::Transaction,
    },
    store::PaymentStore,
};

#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn PaymentStore>,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    /// Unexpired record for `key`, or `None`.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyKey>, AppError> {
        self.store.find_idempotency_key(key, Utc::now()).await
    }

    /// Record `key` for `transaction`. If a live record for the key already
    /// exists, that record is returned and nothing is overwritten.
    pub async fn store(
        &self,
        key: &str,
        transaction: &Transaction,
        response: Value,
    ) -> Result<IdempotencyKey, AppError> {
        let now = Utc::now();
        self.store
            .store_idempotency_key(transaction.id, NewIdempotencyKey::new(key, response, now), now)
            .await
    }

    /// Replace the response remembered for `key` with the one actually sent.
    pub async fn record_response(&self, key: &str, response: Value) -> Result<(), AppError> {
        self.store.record_idempotency_response(key, response).await
    }

    /// Transaction a live key resolves to.
    pub async fn get_transaction(&self, key: &str) -> Result<Option<Transaction>, AppError> {
        let Some(record) = self.find_by_key(key).await? else {
            return Ok(None);
        };
        self.store.find_transaction(record.transaction_id).await
    }

    /// Delete expired keys. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        let deleted = self.store.delete_expired_idempotency_keys(Utc::now()).await?;
        if deleted > 0 {
            tracing::info!(deleted, "purged expired idempotency keys");
        }
        Ok(deleted)
    }

    /// Non-blank and at most `MAX_KEY_LENGTH` characters.
    pub fn is_valid_key_format(key: &str) -> bool {
        !key.trim().is_empty() && key.chars().count() <= MAX_KEY_LENGTH
    }

    /// Run `cleanup_expired` every `period` until the runtime shuts down.
    pub fn spawn_sweeper(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = self.cleanup_expired().await {
                    tracing::error!(error = %e, "idempotency key sweep failed");
                }
            }
        })
    }
}
