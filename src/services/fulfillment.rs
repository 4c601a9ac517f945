//! Idempotent order fulfillment.
//!
//! The webhook is delivered at least once, so every write path here must
//! converge to the same final state under re-delivery and concurrent
//! delivery. The unique index on `orders.stripe_checkout_session_id` is the
//! authority: a duplicate insert is treated as "already fulfilled", never as
//! a failure.

use crate::config::TicketIssuance;
use crate::db::DbPool;
use crate::entities::{customer, order, ticket};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::analytics::AnalyticsService;
use crate::services::stripe::CompletedSession;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    Fulfilled {
        order_id: Uuid,
        customer_id: Uuid,
        tickets_issued: u32,
    },
    /// The session was fulfilled by an earlier delivery; nothing was written.
    AlreadyFulfilled { order_id: Uuid },
}

#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DbPool>,
    issuance: TicketIssuance,
    analytics: Arc<AnalyticsService>,
    events: EventSender,
}

impl FulfillmentService {
    pub fn new(
        db: Arc<DbPool>,
        issuance: TicketIssuance,
        analytics: Arc<AnalyticsService>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            issuance,
            analytics,
            events,
        }
    }

    /// Fulfills a completed checkout session: resolves the customer, records
    /// the order, and issues tickets. Safe to call any number of times for
    /// the same session.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn fulfill(
        &self,
        session: &CompletedSession,
    ) -> Result<FulfillmentOutcome, ServiceError> {
        let stripe_customer_id = session
            .customer
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ServiceError::BadRequest("Missing customer reference on session".into())
            })?;
        let email = session
            .customer_email()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::BadRequest("Missing customer email on session".into()))?;

        if let Some(existing) = self.find_order_by_session(&session.id).await? {
            info!(order_id = %existing.id, "session already fulfilled, skipping");
            return Ok(FulfillmentOutcome::AlreadyFulfilled {
                order_id: existing.id,
            });
        }

        let customer_id = self.resolve_customer(stripe_customer_id, email).await?;

        let tickets_to_issue = match self.issuance {
            TicketIssuance::PerUnit => session.metadata_quantity().unwrap_or(1).max(1),
            TicketIssuance::PerOrder => 1,
        };
        let total_minor = session.amount_total.unwrap_or_default();
        let ticket_type_id = session.metadata_ticket_type_id().map(str::to_string);

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let insert_result = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(customer_id),
            total_minor: Set(total_minor),
            status: Set(order::STATUS_PAID.to_string()),
            stripe_checkout_session_id: Set(session.id.clone()),
            created_at: Set(now),
        }
        .insert(&txn)
        .await;

        if let Err(err) = insert_result {
            txn.rollback().await.ok();
            if is_unique_violation(&err) {
                // Lost the race against a concurrent delivery of the same
                // session. The winner's order is the canonical one.
                let existing = self.find_order_by_session(&session.id).await?.ok_or_else(
                    || ServiceError::InternalError("order vanished after unique conflict".into()),
                )?;
                info!(order_id = %existing.id, "concurrent delivery won, skipping");
                return Ok(FulfillmentOutcome::AlreadyFulfilled {
                    order_id: existing.id,
                });
            }
            return Err(ServiceError::DatabaseError(err));
        }

        for _ in 0..tickets_to_issue {
            ticket::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                customer_id: Set(customer_id),
                ticket_type_id: Set(ticket_type_id.clone()),
                status: Set(ticket::STATUS_ACTIVE.to_string()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        metrics::counter!("kyrat_orders_fulfilled_total", 1);
        metrics::counter!("kyrat_tickets_issued_total", tickets_to_issue as u64);

        info!(
            %order_id,
            %customer_id,
            total_minor,
            tickets_issued = tickets_to_issue,
            "order fulfilled"
        );

        self.analytics.emit_purchase(&session.id, total_minor);
        self.events
            .send(Event::OrderFulfilled {
                order_id,
                customer_id,
                total_minor,
                tickets_issued: tickets_to_issue,
            })
            .await;

        Ok(FulfillmentOutcome::Fulfilled {
            order_id,
            customer_id,
            tickets_issued: tickets_to_issue,
        })
    }

    async fn find_order_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::StripeCheckoutSessionId.eq(session_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Resolves a customer by provider id, creating one on first sight.
    /// The email recorded at creation wins; later sessions with a different
    /// email for the same provider customer do not update it.
    async fn resolve_customer(
        &self,
        stripe_customer_id: &str,
        email: &str,
    ) -> Result<Uuid, ServiceError> {
        if let Some(existing) = self.find_customer_by_stripe_id(stripe_customer_id).await? {
            return Ok(existing.id);
        }

        let id = Uuid::new_v4();
        let insert_result = customer::ActiveModel {
            id: Set(id),
            stripe_id: Set(stripe_customer_id.to_string()),
            email: Set(email.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await;

        match insert_result {
            Ok(created) => {
                info!(customer_id = %created.id, "customer created");
                self.events.send(Event::CustomerCreated(created.id)).await;
                Ok(created.id)
            }
            Err(err) if is_unique_violation(&err) => {
                // A concurrent delivery created the customer first.
                let existing = self
                    .find_customer_by_stripe_id(stripe_customer_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "customer vanished after unique conflict".into(),
                        )
                    })?;
                warn!(customer_id = %existing.id, "customer insert raced, reusing existing");
                Ok(existing.id)
            }
            Err(err) => Err(ServiceError::DatabaseError(err)),
        }
    }

    async fn find_customer_by_stripe_id(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<customer::Model>, ServiceError> {
        customer::Entity::find()
            .filter(customer::Column::StripeId.eq(stripe_customer_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
