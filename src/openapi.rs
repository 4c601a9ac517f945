use crate::catalog::TicketType;
use crate::errors::ErrorResponse;
use crate::handlers;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kyrat Festival Ticketing API",
        description = "Checkout and fulfillment flow for festival ticket sales",
        version = env!("CARGO_PKG_VERSION")
    ),
    servers((url = "/api/v1")),
    paths(
        handlers::checkout::create_checkout_session,
        handlers::checkout::list_ticket_types,
        handlers::webhooks::handle_payment_webhook,
    ),
    components(schemas(
        TicketType,
        ErrorResponse,
        handlers::checkout::CreateCheckoutRequest,
        handlers::checkout::CheckoutSessionResponse,
    )),
    tags(
        (name = "checkout", description = "Catalog lookup and checkout session initiation"),
        (name = "webhooks", description = "Payment provider webhook intake")
    )
)]
pub struct ApiDoc;

/// Swagger UI router serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
