//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own validation, idempotency and the ordering of storage and
//! gateway calls.

pub mod fee_calculator;
pub mod idempotency_service;
pub mod payment_service;
pub mod webhook_service;
