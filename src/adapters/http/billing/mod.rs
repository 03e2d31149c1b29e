//! HTTP surface for the billing module.

mod dto;
mod handlers;
mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedSubscriber, BillingAppState, RedirectPages};
pub use routes::{billing_router, billing_routes, callback_routes, webhook_routes};
