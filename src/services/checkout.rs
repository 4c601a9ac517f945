//! Checkout session initiation.
//!
//! Resolves the requested ticket type against the server-side catalog and
//! creates a provider-hosted checkout session. Prices always come from the
//! catalog; nothing the client sends can influence the amount charged.

use crate::catalog::Catalog;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::analytics::AnalyticsService;
use crate::services::stripe::{CreateSessionParams, StripeClient};
use std::sync::Arc;
use tracing::{error, info, instrument};

const CURRENCY: &str = "usd";

#[derive(Clone)]
pub struct CheckoutService {
    stripe: Arc<StripeClient>,
    catalog: Arc<Catalog>,
    analytics: Arc<AnalyticsService>,
    events: EventSender,
    default_origin: String,
    max_quantity: u32,
}

impl CheckoutService {
    pub fn new(
        stripe: Arc<StripeClient>,
        catalog: Arc<Catalog>,
        analytics: Arc<AnalyticsService>,
        events: EventSender,
        default_origin: String,
        max_quantity: u32,
    ) -> Self {
        Self {
            stripe,
            catalog,
            analytics,
            events,
            default_origin,
            max_quantity,
        }
    }

    /// Creates a checkout session for `quantity` units of `ticket_type_id`.
    /// `origin` is the caller's origin for redirect URLs; falls back to the
    /// configured default when absent.
    #[instrument(skip(self), fields(ticket_type_id = %ticket_type_id, quantity))]
    pub async fn create_session(
        &self,
        ticket_type_id: &str,
        quantity: u32,
        origin: Option<&str>,
    ) -> Result<String, ServiceError> {
        if quantity == 0 || quantity > self.max_quantity {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be between 1 and {}",
                self.max_quantity
            )));
        }

        let ticket_type = self.catalog.find(ticket_type_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Ticket type {} not found", ticket_type_id))
        })?;

        let origin = origin
            .filter(|o| !o.trim().is_empty())
            .unwrap_or(&self.default_origin)
            .trim_end_matches('/');

        let params = CreateSessionParams {
            product_name: ticket_type.name.clone(),
            product_description: ticket_type.description.clone(),
            currency: CURRENCY.into(),
            unit_amount_minor: ticket_type.price_minor,
            quantity,
            success_url: format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", origin),
            cancel_url: format!("{}/canceled", origin),
            ticket_type_id: ticket_type.id.clone(),
        };

        let session = self
            .stripe
            .create_checkout_session(&params)
            .await
            .map_err(|e| {
                error!(error = %e, "checkout session creation failed");
                ServiceError::PaymentProvider(e.to_string())
            })?;

        info!(session_id = %session.id, "checkout session created");

        self.analytics
            .emit_begin_checkout(&session.id, &ticket_type.id, quantity);
        self.events
            .send(Event::CheckoutStarted {
                session_id: session.id.clone(),
                ticket_type_id: ticket_type.id.clone(),
                quantity,
            })
            .await;

        Ok(session.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn service(max_quantity: u32) -> CheckoutService {
        let (tx, _rx) = mpsc::channel(8);
        CheckoutService::new(
            Arc::new(StripeClient::new(
                "http://127.0.0.1:1".into(),
                "sk_test_key".into(),
            )),
            Arc::new(Catalog::seed()),
            Arc::new(AnalyticsService::new(
                "https://analytics.example.com".into(),
                None,
            )),
            EventSender::new(tx),
            "http://localhost:3000".into(),
            max_quantity,
        )
    }

    #[tokio::test]
    async fn zero_quantity_rejected_before_any_network_call() {
        let svc = service(10);
        let err = svc
            .create_session("kyrat-day-pass", 0, None)
            .await
            .expect_err("zero quantity");
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn over_limit_quantity_rejected() {
        let svc = service(10);
        let err = svc
            .create_session("kyrat-day-pass", 11, None)
            .await
            .expect_err("over limit");
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn unknown_ticket_type_is_not_found() {
        let svc = service(10);
        let err = svc
            .create_session("kyrat-moon-pass", 1, None)
            .await
            .expect_err("unknown ticket type");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
