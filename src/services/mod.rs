pub mod analytics;
pub mod checkout;
pub mod fulfillment;
pub mod stripe;
