mod common;

use axum::http::StatusCode;
use common::{
    assert_status, completed_session_event, response_json, TestApp, TEST_WEBHOOK_SECRET,
};
use kyrat_api::config::TicketIssuance;
use kyrat_api::entities::{order, ticket};
use kyrat_api::services::stripe::signature_header;
use rstest::rstest;
use serde_json::json;

#[tokio::test]
async fn completed_session_fulfills_customer_order_and_tickets() {
    let app = TestApp::spawn().await;
    let payload = completed_session_event(
        "cs_live_1",
        Some("cus_abc"),
        Some("pagan@kyrat.example"),
        5000,
        "kyrat-day-pass",
        2,
    );

    let response = app.post_signed_webhook(payload).await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["received"], true);

    let customers = app.customers().await;
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].stripe_id, "cus_abc");
    assert_eq!(customers[0].email, "pagan@kyrat.example");

    let orders = app.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total_minor, 5000);
    assert_eq!(orders[0].status, order::STATUS_PAID);
    assert_eq!(orders[0].stripe_checkout_session_id, "cs_live_1");
    assert_eq!(orders[0].customer_id, customers[0].id);

    let tickets = app.tickets().await;
    assert_eq!(tickets.len(), 2);
    for t in &tickets {
        assert_eq!(t.order_id, orders[0].id);
        assert_eq!(t.customer_id, customers[0].id);
        assert_eq!(t.status, ticket::STATUS_ACTIVE);
        assert_eq!(t.ticket_type_id.as_deref(), Some("kyrat-day-pass"));
    }
}

#[tokio::test]
async fn invalid_signatures_are_rejected_without_writes() {
    let app = TestApp::spawn().await;
    let payload = completed_session_event(
        "cs_live_2",
        Some("cus_abc"),
        Some("pagan@kyrat.example"),
        2500,
        "kyrat-day-pass",
        1,
    );
    let now = chrono::Utc::now().timestamp();

    // Missing header.
    let response = app.post_webhook(payload.clone(), None).await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    // Signed with the wrong secret.
    let wrong = signature_header(now, &payload, "whsec_wrong");
    let response = app.post_webhook(payload.clone(), Some(&wrong)).await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    // Body tampered after signing.
    let valid = signature_header(now, &payload, TEST_WEBHOOK_SECRET);
    let mut tampered = payload.clone();
    let pos = tampered.len() / 2;
    tampered[pos] ^= 0x01;
    let response = app.post_webhook(tampered, Some(&valid)).await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    // Stale timestamp.
    let stale = signature_header(now - 3600, &payload, TEST_WEBHOOK_SECRET);
    let response = app.post_webhook(payload.clone(), Some(&stale)).await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    assert!(app.customers().await.is_empty());
    assert!(app.orders().await.is_empty());
    assert!(app.tickets().await.is_empty());
}

#[tokio::test]
async fn unrelated_event_types_are_acknowledged_without_writes() {
    let app = TestApp::spawn().await;
    let payload = json!({
        "id": "evt_ignored",
        "type": "checkout.session.async_payment_failed",
        "data": { "object": { "id": "cs_live_3" } }
    })
    .to_string()
    .into_bytes();

    let response = app.post_signed_webhook(payload).await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["received"], true);

    assert!(app.orders().await.is_empty());
    assert!(app.tickets().await.is_empty());
}

#[tokio::test]
async fn duplicate_delivery_creates_exactly_one_order() {
    let app = TestApp::spawn().await;
    let payload = completed_session_event(
        "cs_live_4",
        Some("cus_dup"),
        Some("dup@kyrat.example"),
        10000,
        "kyrat-full-festival",
        2,
    );

    for _ in 0..3 {
        let response = app.post_signed_webhook(payload.clone()).await;
        assert_status(&response, StatusCode::OK);
    }

    assert_eq!(app.customers().await.len(), 1);
    assert_eq!(app.orders().await.len(), 1);
    assert_eq!(app.tickets().await.len(), 2);
}

#[tokio::test]
async fn customer_is_resolved_by_provider_id_and_first_email_wins() {
    let app = TestApp::spawn().await;

    let first = completed_session_event(
        "cs_live_5",
        Some("cus_same"),
        Some("first@kyrat.example"),
        2500,
        "kyrat-day-pass",
        1,
    );
    let second = completed_session_event(
        "cs_live_6",
        Some("cus_same"),
        Some("second@kyrat.example"),
        5000,
        "kyrat-full-festival",
        1,
    );

    assert_status(&app.post_signed_webhook(first).await, StatusCode::OK);
    assert_status(&app.post_signed_webhook(second).await, StatusCode::OK);

    let customers = app.customers().await;
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].email, "first@kyrat.example");

    let orders = app.orders().await;
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o.customer_id == customers[0].id));
}

#[tokio::test]
async fn session_without_customer_details_is_rejected() {
    let app = TestApp::spawn().await;

    let missing_customer = completed_session_event(
        "cs_live_7",
        None,
        Some("ajay@kyrat.example"),
        2500,
        "kyrat-day-pass",
        1,
    );
    let response = app.post_signed_webhook(missing_customer).await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    let missing_email = completed_session_event(
        "cs_live_8",
        Some("cus_noemail"),
        None,
        2500,
        "kyrat-day-pass",
        1,
    );
    let response = app.post_signed_webhook(missing_email).await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    assert!(app.customers().await.is_empty());
    assert!(app.orders().await.is_empty());
}

#[rstest]
#[case(TicketIssuance::PerUnit, 3, 3)]
#[case(TicketIssuance::PerOrder, 3, 1)]
#[tokio::test]
async fn ticket_cardinality_follows_issuance_mode(
    #[case] issuance: TicketIssuance,
    #[case] quantity: u32,
    #[case] expected_tickets: usize,
) {
    let app = TestApp::spawn_with(|cfg| cfg.ticket_issuance = issuance).await;
    let payload = completed_session_event(
        "cs_live_9",
        Some("cus_mode"),
        Some("mode@kyrat.example"),
        7500,
        "kyrat-day-pass",
        quantity,
    );

    assert_status(&app.post_signed_webhook(payload).await, StatusCode::OK);
    assert_eq!(app.orders().await.len(), 1);
    assert_eq!(app.tickets().await.len(), expected_tickets);
}

#[tokio::test]
async fn session_without_quantity_metadata_issues_one_ticket() {
    let app = TestApp::spawn().await;
    // Metadata-free session, as an older client might create.
    let payload = json!({
        "id": "evt_no_meta",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_live_10",
                "customer": "cus_nometa",
                "customer_details": { "email": "nometa@kyrat.example" },
                "amount_total": 2500
            }
        }
    })
    .to_string()
    .into_bytes();

    assert_status(&app.post_signed_webhook(payload).await, StatusCode::OK);

    let tickets = app.tickets().await;
    assert_eq!(tickets.len(), 1);
    assert!(tickets[0].ticket_type_id.is_none());
}
