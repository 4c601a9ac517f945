use crate::catalog::TicketType;
use crate::errors::{ErrorResponse, ServiceError};
use crate::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCheckoutRequest {
    /// Catalog id of the ticket type to purchase
    #[serde(rename = "ticketTypeId")]
    pub ticket_type_id: String,
    /// Number of units; bounded by server configuration
    pub quantity: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    /// Provider checkout session id; the client redirects with it
    pub id: String,
}

/// Creates a provider-hosted checkout session for a catalog ticket type.
#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 400, description = "Invalid quantity", body = ErrorResponse),
        (status = 404, description = "Unknown ticket type", body = ErrorResponse),
        (status = 500, description = "Payment provider unavailable", body = ErrorResponse)
    ),
    tag = "checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutSessionResponse>, ServiceError> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    let session_id = state
        .checkout
        .create_session(&request.ticket_type_id, request.quantity, origin)
        .await?;

    Ok(Json(CheckoutSessionResponse { id: session_id }))
}

/// Lists the purchasable ticket types in catalog order.
#[utoipa::path(
    get,
    path = "/ticket-types",
    responses(
        (status = 200, description = "Catalog ticket types", body = [TicketType])
    ),
    tag = "checkout"
)]
pub async fn list_ticket_types(
    State(state): State<AppState>,
) -> (StatusCode, Json<Vec<TicketType>>) {
    let types = state.catalog.all().into_iter().cloned().collect();
    (StatusCode::OK, Json(types))
}
