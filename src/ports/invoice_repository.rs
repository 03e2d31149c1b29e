//! InvoiceRepository port.
//!
//! Uniqueness on payment_id enforces the at-most-one-invoice-per-payment
//! rule; a losing concurrent insert is the idempotent no-op path.

use async_trait::async_trait;

use crate::domain::billing::Invoice;
use crate::domain::foundation::{DomainError, InvoiceId, PaymentId};

/// Outcome of an invoice insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceInsert {
    /// The invoice was created.
    Inserted(Invoice),
    /// An invoice for this payment already exists; returned as-is.
    AlreadyExists(Invoice),
}

impl InvoiceInsert {
    /// The invoice row, whichever way the insert went.
    pub fn into_invoice(self) -> Invoice {
        match self {
            InvoiceInsert::Inserted(i) | InvoiceInsert::AlreadyExists(i) => i,
        }
    }
}

/// Port for invoice persistence.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Insert an invoice, deduplicating on payment id.
    async fn insert(&self, invoice: Invoice) -> Result<InvoiceInsert, DomainError>;

    /// Find by internal id.
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError>;

    /// Find the invoice for a payment, if one was emitted.
    async fn find_by_payment_id(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Invoice>, DomainError>;
}
