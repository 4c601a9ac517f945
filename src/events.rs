use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the checkout and fulfillment flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutStarted {
        session_id: String,
        ticket_type_id: String,
        quantity: u32,
    },
    CustomerCreated(Uuid),
    OrderFulfilled {
        order_id: Uuid,
        customer_id: Uuid,
        total_minor: i64,
        tickets_issued: u32,
    },
    WebhookIgnored {
        event_type: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Delivery is best-effort; a full or
    /// closed channel must not fail the request that produced the event.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            tracing::warn!("Failed to send event: {}", e);
        }
    }
}

/// Processes domain events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::CheckoutStarted {
                session_id,
                ticket_type_id,
                quantity,
            } => {
                info!(%session_id, %ticket_type_id, quantity, "checkout started");
            }
            Event::CustomerCreated(id) => {
                info!(customer_id = %id, "customer created");
            }
            Event::OrderFulfilled {
                order_id,
                customer_id,
                total_minor,
                tickets_issued,
            } => {
                info!(
                    %order_id,
                    %customer_id,
                    total_minor,
                    tickets_issued,
                    "order fulfilled"
                );
            }
            Event::WebhookIgnored { event_type } => {
                info!(%event_type, "webhook event ignored");
            }
        }
    }
}
