//! Shared integration test harness.
//!
//! Each test gets its own SQLite database file and its own mock payment
//! provider, and drives the real router in-process via `oneshot`.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use kyrat_api::config::AppConfig;
use kyrat_api::db::{self, DbConfig, DbPool};
use kyrat_api::entities::{customer, order, ticket};
use kyrat_api::events::{self, EventSender};
use kyrat_api::services::stripe::signature_header;
use kyrat_api::AppState;
use sea_orm::EntityTrait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DbPool>,
    pub provider: MockServer,
    db_path: PathBuf,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawns the app with a configuration hook applied before wiring.
    pub async fn spawn_with<F>(customize: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let provider = MockServer::start().await;

        let db_path = std::env::temp_dir().join(format!("kyrat-test-{}.sqlite", Uuid::new_v4()));
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut config = AppConfig::new(
            db_url.clone(),
            "127.0.0.1".into(),
            0,
            "development".into(),
            "sk_test_key".into(),
            TEST_WEBHOOK_SECRET.into(),
        );
        config.stripe_api_base = provider.uri();
        customize(&mut config);

        // Single connection so every query sees the same SQLite file state.
        let db_config = DbConfig {
            url: db_url,
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(5),
        };
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("test database connects");
        db::run_migrations(&pool).await.expect("migrations apply");

        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(events::process_events(event_rx));

        let db = Arc::new(pool);
        let state = AppState::new(db.clone(), Arc::new(config), EventSender::new(event_tx));

        Self {
            router: kyrat_api::create_router(state),
            db,
            provider,
            db_path,
        }
    }

    /// Mounts a successful session-creation response on the mock provider.
    pub async fn mock_session_created(&self, session_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": session_id })))
            .mount(&self.provider)
            .await;
    }

    /// Mounts a provider failure on session creation.
    pub async fn mock_session_failure(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({ "error": { "message": "internal provider detail" } })),
            )
            .mount(&self.provider)
            .await;
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.post_json_with_origin(uri, body, None).await
    }

    pub async fn post_json_with_origin(
        &self,
        uri: &str,
        body: Value,
        origin: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("request builds");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request builds");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds")
    }

    /// Delivers a raw webhook body with the given signature header value.
    pub async fn post_webhook(&self, body: Vec<u8>, signature: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/payment")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        let request = builder.body(Body::from(body)).expect("request builds");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds")
    }

    /// Delivers a webhook body signed with the test secret.
    pub async fn post_signed_webhook(&self, body: Vec<u8>) -> Response<Body> {
        let now = chrono::Utc::now().timestamp();
        let signature = signature_header(now, &body, TEST_WEBHOOK_SECRET);
        self.post_webhook(body, Some(&signature)).await
    }

    pub async fn customers(&self) -> Vec<customer::Model> {
        customer::Entity::find()
            .all(self.db.as_ref())
            .await
            .expect("customers query")
    }

    pub async fn orders(&self) -> Vec<order::Model> {
        order::Entity::find()
            .all(self.db.as_ref())
            .await
            .expect("orders query")
    }

    pub async fn tickets(&self) -> Vec<ticket::Model> {
        ticket::Entity::find()
            .all(self.db.as_ref())
            .await
            .expect("tickets query")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}

/// Builds a `checkout.session.completed` event payload in the provider's
/// envelope shape.
pub fn completed_session_event(
    session_id: &str,
    customer: Option<&str>,
    email: Option<&str>,
    amount_total: i64,
    ticket_type_id: &str,
    quantity: u32,
) -> Vec<u8> {
    let customer_details = match email {
        Some(email) => json!({ "email": email }),
        None => json!({ "email": null }),
    };
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "customer": customer,
                "customer_details": customer_details,
                "amount_total": amount_total,
                "metadata": {
                    "ticketTypeId": ticket_type_id,
                    "quantity": quantity.to_string()
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}
