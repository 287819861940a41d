//! Gift Registry Payments - Main Application Entry Point
//!
//! REST API for buying wedding registry gifts through PagSeguro.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Gateway**: PagSeguro REST API via reqwest
//! - **Webhook authentication**: HMAC-SHA256 over the raw body
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Start the idempotency key sweeper
//! 5. Build HTTP router and start server on configured port

use std::sync::Arc;

use gift_registry_payments::{
    app::{self, AppState},
    config::Config,
    db,
    gateway::PagSeguroClient,
    services::idempotency_service::IdempotencyService,
    store::{PaymentStore, PgPaymentStore},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");
    if config.pagseguro_webhook_secret.is_none() {
        tracing::warn!("PAGSEGURO_WEBHOOK_SECRET is not set; all webhooks will be rejected");
    }

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(pool));
    let gateway = Arc::new(PagSeguroClient::new(config.gateway_config())?);

    IdempotencyService::new(store.clone()).spawn_sweeper(config.sweep_interval());

    let state = AppState::new(store, gateway, config.payment_settings());
    let app = app::router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
