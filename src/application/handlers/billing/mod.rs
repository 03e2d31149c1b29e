//! Billing command handlers.
//!
//! Each handler is a thin orchestration over the ports: the transition
//! rules live in the domain layer, the concurrency control lives in the
//! storage constraints, and the handlers wire the two together.

mod cancel_subscription;
mod confirm_redirect;
mod emit_invoice;
mod process_webhook;
mod record_payment;
mod start_checkout;

pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use confirm_redirect::{
    ConfirmRedirectCommand, ConfirmRedirectHandler, ConfirmRedirectResult,
};
pub use emit_invoice::EmitInvoiceHandler;
pub use process_webhook::{
    ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
};
pub use record_payment::{RecordPaymentCommand, RecordPaymentHandler, RecordPaymentResult};
pub use start_checkout::{StartCheckoutCommand, StartCheckoutHandler, StartCheckoutResult};
