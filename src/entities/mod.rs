pub mod customer;
pub mod order;
pub mod ticket;

pub use customer::Entity as Customer;
pub use order::Entity as Order;
pub use ticket::Entity as Ticket;
