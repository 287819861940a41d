//! Data models representing database entities and API payloads.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies of the purchase and webhook endpoints.

/// Gift catalog entries
pub mod gift_item;
/// Client-supplied idempotency keys
pub mod idempotency_key;
/// Per-wedding fee configuration
pub mod registry_config;
/// Payment attempts
pub mod transaction;
/// Inbound gateway notifications
pub mod webhook;

/// Error returned when a stored text column holds a value outside its enum.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
