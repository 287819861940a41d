//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use std::time::Duration;

use serde::Deserialize;

use crate::{gateway::PagSeguroConfig, services::payment_service::PaymentSettings};

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `PAGSEGURO_API_URL` (optional): defaults to the sandbox
/// - `PAGSEGURO_TOKEN` (required): bearer token
/// - `PAGSEGURO_WEBHOOK_SECRET` (optional): without it every webhook is rejected
/// - `PAGSEGURO_NOTIFICATION_URL` (optional): webhook URL sent with charges
/// - `PAGSEGURO_TIMEOUT_SECS` (optional): gateway timeout, defaults to 15
/// - `PAYMENT_CURRENCY` (optional): defaults to BRL
/// - `PIX_EXPIRATION_MINUTES` (optional): QR code lifetime, defaults to 30
/// - `IDEMPOTENCY_SWEEP_INTERVAL_SECS` (optional): defaults to 3600
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_api_url")]
    pub pagseguro_api_url: String,

    pub pagseguro_token: String,

    #[serde(default)]
    pub pagseguro_webhook_secret: Option<String>,

    #[serde(default)]
    pub pagseguro_notification_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub pagseguro_timeout_secs: u64,

    #[serde(default = "default_currency")]
    pub payment_currency: String,

    #[serde(default = "default_pix_expiration_minutes")]
    pub pix_expiration_minutes: i64,

    #[serde(default = "default_sweep_interval_secs")]
    pub idempotency_sweep_interval_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("{name} is not a valid URL: {value}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_api_url() -> String {
    "https://sandbox.api.pagseguro.com".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_currency() -> String {
    "BRL".to_string()
}

fn default_pix_expiration_minutes() -> i64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    /// - URLs are malformed or a duration is zero
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("PAGSEGURO_API_URL", &self.pagseguro_api_url)?;
        if let Some(url) = &self.pagseguro_notification_url {
            check_url("PAGSEGURO_NOTIFICATION_URL", url)?;
        }
        if self.pagseguro_timeout_secs == 0 {
            return Err(ConfigError::NotPositive("PAGSEGURO_TIMEOUT_SECS"));
        }
        if self.pix_expiration_minutes <= 0 {
            return Err(ConfigError::NotPositive("PIX_EXPIRATION_MINUTES"));
        }
        if self.idempotency_sweep_interval_secs == 0 {
            return Err(ConfigError::NotPositive("IDEMPOTENCY_SWEEP_INTERVAL_SECS"));
        }
        Ok(())
    }

    pub fn gateway_config(&self) -> PagSeguroConfig {
        PagSeguroConfig {
            api_url: self.pagseguro_api_url.clone(),
            token: self.pagseguro_token.clone(),
            webhook_secret: self.pagseguro_webhook_secret.clone(),
            timeout: Duration::from_secs(self.pagseguro_timeout_secs),
        }
    }

    pub fn payment_settings(&self) -> PaymentSettings {
        PaymentSettings {
            currency: self.payment_currency.clone(),
            notification_url: self.pagseguro_notification_url.clone(),
            pix_expiration: chrono::Duration::minutes(self.pix_expiration_minutes),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idempotency_sweep_interval_secs)
    }
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        }),
    }
}
