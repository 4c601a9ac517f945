pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::analytics::AnalyticsService;
use crate::services::checkout::CheckoutService;
use crate::services::fulfillment::FulfillmentService;
use crate::services::stripe::StripeClient;

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub catalog: Arc<Catalog>,
    pub checkout: Arc<CheckoutService>,
    pub fulfillment: Arc<FulfillmentService>,
    pub events: EventSender,
}

impl AppState {
    /// Wires services against the given pool and configuration.
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, events: EventSender) -> Self {
        let catalog = Arc::new(Catalog::seed());
        let analytics = Arc::new(AnalyticsService::from_config(&config));
        let stripe = Arc::new(StripeClient::new(
            config.stripe_api_base.clone(),
            config.stripe_secret_key.clone(),
        ));

        let checkout = Arc::new(CheckoutService::new(
            stripe,
            catalog.clone(),
            analytics.clone(),
            events.clone(),
            config.default_origin.clone(),
            config.max_quantity_per_order,
        ));
        let fulfillment = Arc::new(FulfillmentService::new(
            db.clone(),
            config.ticket_issuance,
            analytics,
            events.clone(),
        ));

        Self {
            db,
            config,
            catalog,
            checkout,
            fulfillment,
            events,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    service: &'static str,
    version: &'static str,
    environment: String,
}

async fn api_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
    })
}

/// Liveness plus a database ping.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "connected" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "unreachable" })),
            )
        }
    }
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/checkout",
            post(handlers::checkout::create_checkout_session),
        )
        .route("/ticket-types", get(handlers::checkout::list_ticket_types))
        .route(
            "/webhooks/payment",
            post(handlers::webhooks::handle_payment_webhook),
        )
        .route("/status", get(api_status))
        .route("/health", get(health_check))
}

/// Builds the application router. Deployment-specific layers (CORS,
/// timeouts) are added by the binary.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/health", get(health_check))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
