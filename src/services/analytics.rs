//! Best-effort analytics emitter.
//!
//! Events are posted to a Measurement Protocol style collection endpoint.
//! Emission is fire-and-forget: failures are logged and never surface to the
//! request that produced them, and the emitter is disabled entirely when no
//! credentials are configured.

use crate::config::AppConfig;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const COLLECT_PATH: &str = "/mp/collect";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AnalyticsService {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
}

impl AnalyticsService {
    pub fn new(endpoint: String, credentials: Option<(String, String)>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.analytics_endpoint.clone(),
            config.analytics_credentials(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Emitted when a checkout session is created.
    pub fn emit_begin_checkout(&self, session_id: &str, ticket_type_id: &str, quantity: u32) {
        self.emit(
            session_id,
            "begin_checkout",
            json!({
                "ticket_type_id": ticket_type_id,
                "quantity": quantity,
            }),
        );
    }

    /// Emitted after an order is fulfilled. `total_minor` is converted to
    /// major currency units for reporting.
    pub fn emit_purchase(&self, session_id: &str, total_minor: i64) {
        self.emit(
            session_id,
            "purchase",
            json!({
                "transaction_id": session_id,
                "value": total_minor as f64 / 100.0,
                "currency": "USD",
            }),
        );
    }

    fn emit(&self, client_id: &str, name: &str, params: serde_json::Value) {
        let Some((measurement_id, api_secret)) = self.credentials.clone() else {
            debug!(event = name, "analytics disabled, dropping event");
            return;
        };

        let url = format!(
            "{}{}?measurement_id={}&api_secret={}",
            self.endpoint, COLLECT_PATH, measurement_id, api_secret
        );
        let body = json!({
            "client_id": client_id,
            "events": [{"name": name, "params": params}],
        });

        let http = self.http.clone();
        let event_name = name.to_string();
        tokio::spawn(async move {
            let result = http
                .post(&url)
                .timeout(SEND_TIMEOUT)
                .json(&body)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!(event = %event_name, "analytics event delivered");
                }
                Ok(resp) => {
                    warn!(
                        event = %event_name,
                        status = %resp.status(),
                        "analytics endpoint rejected event"
                    );
                }
                Err(e) => {
                    warn!(event = %event_name, error = %e, "analytics delivery failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_credentials() {
        let svc = AnalyticsService::new("https://analytics.example.com".into(), None);
        assert!(!svc.is_enabled());
    }

    #[tokio::test]
    async fn emit_without_credentials_is_a_no_op() {
        let svc = AnalyticsService::new("https://analytics.example.com".into(), None);
        // Must not panic or spawn network work.
        svc.emit_begin_checkout("cs_test_1", "kyrat-day-pass", 2);
        svc.emit_purchase("cs_test_1", 5000);
    }
}
