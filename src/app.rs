//! Router and shared handler state.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    gateway::PaymentGateway,
    handlers,
    services::{
        payment_service::{PaymentService, PaymentSettings},
        webhook_service::WebhookService,
    },
    store::PaymentStore,
};

/// State shared with every handler via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PaymentStore>,
    pub payments: PaymentService,
    pub webhooks: WebhookService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            payments: PaymentService::new(store.clone(), gateway.clone(), settings),
            webhooks: WebhookService::new(store.clone(), gateway),
            store,
        }
    }
}

/// Build the HTTP router.
///
/// Guests reach the purchase and status routes from the public wedding site;
/// the webhook route authenticates by signature.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/gifts/{gift_id}/purchase",
            post(handlers::purchases::create_purchase),
        )
        .route(
            "/api/v1/transactions/{internal_id}",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/webhooks/pagseguro",
            post(handlers::webhooks::pagseguro_webhook),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
