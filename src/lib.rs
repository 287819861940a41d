//! Gift registry payments.
//!
//! Guests buy wedding gifts by credit card or PIX through PagSeguro. The
//! crate creates charges idempotently, splits the processor fee between
//! guest and couple, and moves gift stock only when the gateway confirms
//! payment by webhook.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;
