//! PaymentRepository port.
//!
//! The unique constraint on the provider payment id is the single most
//! important invariant in the system: at most one Payment row per
//! provider payment id, regardless of how many times the event is
//! delivered. Two simultaneous deliveries race to insert; the loser's
//! insert resolves to `Duplicate`, never to an error surfaced upstream.

use async_trait::async_trait;

use crate::domain::billing::Payment;
use crate::domain::foundation::{DomainError, InvoiceId, PaymentId, SubscriptionId};

/// Outcome of a payment insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentInsert {
    /// First sighting; the row was inserted.
    Inserted(Payment),
    /// A row with this provider payment id already exists; returned as-is.
    Duplicate(Payment),
}

impl PaymentInsert {
    /// The payment row, whichever way the insert went.
    pub fn into_payment(self) -> Payment {
        match self {
            PaymentInsert::Inserted(p) | PaymentInsert::Duplicate(p) => p,
        }
    }

    /// True if this call created the row.
    pub fn was_inserted(&self) -> bool {
        matches!(self, PaymentInsert::Inserted(_))
    }
}

/// Port for payment persistence.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert a payment, deduplicating on provider payment id.
    async fn insert(&self, payment: Payment) -> Result<PaymentInsert, DomainError>;

    /// Find by internal id.
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    /// Find by provider payment id (the dedup short-circuit lookup).
    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError>;

    /// All payments recorded against a subscription, oldest first.
    async fn list_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<Payment>, DomainError>;

    /// Link the emitted invoice to its payment.
    async fn attach_invoice(
        &self,
        payment_id: &PaymentId,
        invoice_id: &InvoiceId,
    ) -> Result<(), DomainError>;
}
