//! PostgreSQL repository adapters.
//!
//! Uses sqlx for type-safe queries with connection pooling. The unique
//! indexes created in `migrations/` carry the concurrency semantics: the
//! adapters translate unique-violation / conflict outcomes into the
//! ports' dedup and claim results instead of surfacing them as errors.

mod invoice_repository;
mod payment_repository;
mod plan_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use invoice_repository::PostgresInvoiceRepository;
pub use payment_repository::PostgresPaymentRepository;
pub use plan_repository::PostgresPlanRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::billing::{PaymentStatus, SubscriptionStatus};
use crate::domain::foundation::{Currency, DomainError, ErrorCode};

pub(crate) fn parse_subscription_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    match s {
        "pending" => Ok(SubscriptionStatus::Pending),
        "authorized" => Ok(SubscriptionStatus::Authorized),
        "active" => Ok(SubscriptionStatus::Active),
        "paused" => Ok(SubscriptionStatus::Paused),
        "cancelled" => Ok(SubscriptionStatus::Cancelled),
        "expired" => Ok(SubscriptionStatus::Expired),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid subscription status value: {}", s),
        )),
    }
}

pub(crate) fn subscription_status_to_str(status: &SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Pending => "pending",
        SubscriptionStatus::Authorized => "authorized",
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Paused => "paused",
        SubscriptionStatus::Cancelled => "cancelled",
        SubscriptionStatus::Expired => "expired",
    }
}

pub(crate) fn parse_payment_status(s: &str) -> Result<PaymentStatus, DomainError> {
    match s {
        "pending" => Ok(PaymentStatus::Pending),
        "approved" => Ok(PaymentStatus::Approved),
        "authorized" => Ok(PaymentStatus::Authorized),
        "in_process" => Ok(PaymentStatus::InProcess),
        "rejected" => Ok(PaymentStatus::Rejected),
        "refunded" => Ok(PaymentStatus::Refunded),
        "chargeback" => Ok(PaymentStatus::Chargeback),
        "cancelled" => Ok(PaymentStatus::Cancelled),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid payment status value: {}", s),
        )),
    }
}

pub(crate) fn parse_currency(s: &str) -> Result<Currency, DomainError> {
    Currency::new(s)
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid currency: {}", e)))
}
