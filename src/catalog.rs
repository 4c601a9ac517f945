use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// A purchasable ticket definition. The catalog is fixed at deploy time;
/// there is no admin mutation surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TicketType {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Price in minor currency units (cents).
    pub price_minor: i64,
}

/// Immutable ticket-type catalog, indexed by id at construction.
#[derive(Clone, Debug)]
pub struct Catalog {
    by_id: HashMap<String, TicketType>,
    ordered: Vec<String>,
}

impl Catalog {
    pub fn new(ticket_types: Vec<TicketType>) -> Self {
        let ordered = ticket_types.iter().map(|t| t.id.clone()).collect();
        let by_id = ticket_types
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Self { by_id, ordered }
    }

    /// The festival catalog seeded at process start.
    pub fn seed() -> Self {
        Self::new(vec![
            TicketType {
                id: "kyrat-day-pass".into(),
                name: "Kyrat Day Pass".into(),
                description: "Single-day access to all main-stage performances".into(),
                price_minor: 2500,
            },
            TicketType {
                id: "kyrat-full-festival".into(),
                name: "Kyrat Full Festival".into(),
                description: "All three days, including the campus showcase".into(),
                price_minor: 5000,
            },
            TicketType {
                id: "kyrat-vip".into(),
                name: "Kyrat VIP".into(),
                description: "Full festival with backstage access and lounge entry".into(),
                price_minor: 12000,
            },
        ])
    }

    pub fn find(&self, ticket_type_id: &str) -> Option<&TicketType> {
        self.by_id.get(ticket_type_id)
    }

    /// Ticket types in catalog order.
    pub fn all(&self) -> Vec<&TicketType> {
        self.ordered
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
