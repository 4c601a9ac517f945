pub mod checkout;
pub mod webhooks;
