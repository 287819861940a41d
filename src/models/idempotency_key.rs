//! Idempotency key model.
//!
//! A guest's client sends the same key when it retries a purchase (network
//! timeout, double click). The key resolves to the transaction created by the
//! first request, so the gateway is charged at most once per key.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Maximum accepted key length.
pub const MAX_KEY_LENGTH: usize = 100;

/// How long a key keeps resolving to its transaction.
pub fn key_ttl() -> Duration {
    Duration::hours(24)
}

/// Represents an idempotency key record from the database.
///
/// # Database Table
///
/// Maps to `idempotency_keys`. `key` is unique; expired rows are purged by
/// the periodic sweep.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct IdempotencyKey {
    pub id: Uuid,
    pub key: String,
    pub transaction_id: Uuid,

    /// Response body returned to the client that created the key
    pub response: serde_json::Value,

    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Values for a key written alongside a new transaction.
#[derive(Debug, Clone)]
pub struct NewIdempotencyKey {
    pub key: String,
    pub response: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl NewIdempotencyKey {
    /// Key that expires `key_ttl()` from `now`.
    pub fn new(key: impl Into<String>, response: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            response,
            expires_at: now + key_ttl(),
        }
    }
}
