//! Payment provider client and webhook verification.
//!
//! Sessions are created against the provider's form-encoded checkout API.
//! Webhook payloads are authenticated with HMAC-SHA256 over the exact raw
//! request bytes (`"{timestamp}.{body}"`), so this module only ever sees the
//! unparsed body.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const EVENT_CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("request to payment provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignatureHeader,

    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Parameters for a single-line-item, payment-mode checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub product_name: String,
    pub product_description: String,
    pub currency: String,
    pub unit_amount_minor: i64,
    pub quantity: u32,
    pub success_url: String,
    pub cancel_url: String,
    pub ticket_type_id: String,
}

impl CreateSessionParams {
    /// Form-encoded body for the provider's checkout session endpoint.
    /// Metadata is the only channel by which the webhook later recovers
    /// what was purchased.
    pub fn to_form(&self) -> Vec<(String, String)> {
        vec![
            ("payment_method_types[0]".into(), "card".into()),
            ("mode".into(), "payment".into()),
            (
                "line_items[0][price_data][currency]".into(),
                self.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                self.product_name.clone(),
            ),
            (
                "line_items[0][price_data][product_data][description]".into(),
                self.product_description.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                self.unit_amount_minor.to_string(),
            ),
            ("line_items[0][quantity]".into(), self.quantity.to_string()),
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
            ("metadata[ticketTypeId]".into(), self.ticket_type_id.clone()),
            ("metadata[quantity]".into(), self.quantity.to_string()),
        ]
    }
}

/// Opaque handle to a provider-hosted checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionHandle {
    pub id: String,
}

/// Thin client for the provider's checkout API.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(api_base: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    pub async fn create_checkout_session(
        &self,
        params: &CreateSessionParams,
    ) -> Result<CheckoutSessionHandle, StripeError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        debug!(%url, quantity = params.quantity, "creating checkout session");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params.to_form())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<CheckoutSessionHandle>().await?)
    }
}

/// A verified inbound webhook event, keyed by the provider's `type`
/// discriminator. Unrecognized types are acknowledged and ignored.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CheckoutSessionCompleted(CompletedSession),
    Ignored { event_type: String },
}

/// Projection of a completed checkout session as delivered by the webhook.
/// Field presence is validated by the fulfillment writer, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    /// Provider customer reference.
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Metadata attached at session creation.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

impl CompletedSession {
    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }

    pub fn metadata_ticket_type_id(&self) -> Option<&str> {
        self.metadata.get("ticketTypeId").map(String::as_str)
    }

    pub fn metadata_quantity(&self) -> Option<u32> {
        self.metadata.get("quantity").and_then(|q| q.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: Value,
}

/// Computes the hex HMAC-SHA256 signature over `"{timestamp}.{payload}"`.
pub fn sign_payload(timestamp: i64, payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a `Stripe-Signature`-style header value; used by tests and tooling.
pub fn signature_header(timestamp: i64, payload: &[u8], secret: &str) -> String {
    format!("t={},v1={}", timestamp, sign_payload(timestamp, payload, secret))
}

fn parse_signature_header(header: &str) -> Result<(i64, String), WebhookError> {
    let mut timestamp = None;
    let mut v1 = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", val)) => timestamp = val.parse::<i64>().ok(),
            Some(("v1", val)) => v1 = Some(val.to_string()),
            _ => {}
        }
    }
    match (timestamp, v1) {
        (Some(t), Some(sig)) if !sig.is_empty() => Ok((t, sig)),
        _ => Err(WebhookError::MalformedHeader),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Verifies the signature over the exact raw bytes of the payload.
/// `tolerance_secs == 0` disables the timestamp check.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), WebhookError> {
    let (timestamp, provided) = parse_signature_header(signature_header)?;

    if tolerance_secs > 0 {
        let now = chrono::Utc::now().timestamp();
        if (now - timestamp).unsigned_abs() > tolerance_secs {
            return Err(WebhookError::StaleTimestamp);
        }
    }

    let expected = sign_payload(timestamp, payload, secret);
    if !constant_time_eq(&expected, &provided) {
        return Err(WebhookError::SignatureMismatch);
    }
    Ok(())
}

/// Authenticates the raw payload and parses it into a typed event.
pub fn construct_event(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<WebhookEvent, WebhookError> {
    verify_signature(payload, signature_header, secret, tolerance_secs)?;

    let envelope: EventEnvelope = serde_json::from_slice(payload)?;
    match envelope.event_type.as_str() {
        EVENT_CHECKOUT_SESSION_COMPLETED => {
            let session: CompletedSession = serde_json::from_value(envelope.data.object)?;
            Ok(WebhookEvent::CheckoutSessionCompleted(session))
        }
        other => Ok(WebhookEvent::Ignored {
            event_type: other.to_string(),
        }),
    }
}
