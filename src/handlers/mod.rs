//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, raw bytes)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Service health probe
pub mod health;
/// Gift purchase endpoint
pub mod purchases;
/// Transaction status polling
pub mod transactions;
/// Inbound gateway notifications
pub mod webhooks;
