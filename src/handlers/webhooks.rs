//! Payment provider webhook endpoint.
//!
//! The body is taken as raw bytes because the signature covers the exact
//! payload as sent; any re-serialization would break verification. Failures
//! are logged by reason only, never with payload contents.

use crate::errors::ServiceError;
use crate::events::Event;
use crate::services::stripe::{self, WebhookEvent};
use crate::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receives provider webhook events. Every authenticated event is
/// acknowledged with 200 so the provider stops retrying; only events the
/// flow acts on trigger writes.
#[utoipa::path(
    post,
    path = "/webhooks/payment",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Signature verification failed or malformed event")
    ),
    tag = "webhooks"
)]
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("webhook rejected: missing signature header");
            ServiceError::BadRequest("Missing signature header".into())
        })?;

    let event = stripe::construct_event(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        state.config.stripe_webhook_tolerance_secs,
    )
    .map_err(|e| {
        warn!(reason = %e, "webhook rejected");
        ServiceError::BadRequest("Webhook verification failed".into())
    })?;

    match event {
        WebhookEvent::CheckoutSessionCompleted(session) => {
            let outcome = state.fulfillment.fulfill(&session).await?;
            info!(session_id = %session.id, ?outcome, "completed session processed");
        }
        WebhookEvent::Ignored { event_type } => {
            metrics::counter!("kyrat_webhook_events_ignored_total", 1);
            state
                .events
                .send(Event::WebhookIgnored { event_type })
                .await;
        }
    }

    Ok(Json(json!({ "received": true })))
}
