//! EmitInvoiceHandler - exactly-once invoice emission for approved payments.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Invoice, Payment};
use crate::domain::foundation::Timestamp;
use crate::ports::{InvoiceRepository, PaymentRepository};

/// Emits the invoice for an approved payment, at most once.
pub struct EmitInvoiceHandler {
    invoices: Arc<dyn InvoiceRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl EmitInvoiceHandler {
    pub fn new(invoices: Arc<dyn InvoiceRepository>, payments: Arc<dyn PaymentRepository>) -> Self {
        Self { invoices, payments }
    }

    /// Emits an invoice if the payment is approved and none exists yet.
    ///
    /// Returns `None` for non-approved payments. A second trigger for the
    /// same payment returns the existing invoice - a no-op, not an error.
    /// Concurrent triggers resolve through the unique payment_id
    /// constraint; the loser adopts the winner's row.
    pub async fn emit_if_approved(
        &self,
        payment: &Payment,
    ) -> Result<Option<Invoice>, BillingError> {
        if !payment.status.is_approved() {
            return Ok(None);
        }

        if let Some(existing) = self.invoices.find_by_payment_id(&payment.id).await? {
            tracing::debug!(
                payment_id = %payment.id,
                invoice = %existing.number,
                "invoice already emitted, skipping"
            );
            return Ok(Some(existing));
        }

        let invoice = Invoice::for_payment(payment, Timestamp::now());
        let invoice = self.invoices.insert(invoice).await?.into_invoice();
        self.payments
            .attach_invoice(&payment.id, &invoice.id)
            .await?;

        tracing::info!(
            payment_id = %payment.id,
            invoice = %invoice.number,
            total_minor = invoice.total_minor,
            "invoice emitted"
        );
        Ok(Some(invoice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryInvoiceRepository, InMemoryPaymentRepository};
    use crate::domain::billing::PaymentStatus;
    use crate::domain::foundation::{Currency, Money, PaymentId, SubscriberId, SubscriptionId};

    fn payment(status: PaymentStatus) -> Payment {
        Payment::record(
            PaymentId::new(),
            SubscriptionId::new(),
            SubscriberId::new(),
            Some("PAY1".to_string()),
            status,
            Money::new(9990, Currency::new("CLP").unwrap()).unwrap(),
            1,
            None,
            serde_json::json!({}),
            Timestamp::now(),
        )
    }

    fn handler() -> (
        EmitInvoiceHandler,
        Arc<InMemoryInvoiceRepository>,
        Arc<InMemoryPaymentRepository>,
    ) {
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        (
            EmitInvoiceHandler::new(invoices.clone(), payments.clone()),
            invoices,
            payments,
        )
    }

    #[tokio::test]
    async fn approved_payment_gets_an_invoice() {
        let (handler, _, payments) = handler();
        let payment = payment(PaymentStatus::Approved);
        payments.insert(payment.clone()).await.unwrap();

        let invoice = handler.emit_if_approved(&payment).await.unwrap();

        let invoice = invoice.expect("invoice should be emitted");
        assert_eq!(invoice.payment_id, payment.id);
        assert_eq!(invoice.total_minor, 9990);

        // The payment row now links back to the invoice.
        let stored = payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.invoice_id, Some(invoice.id));
    }

    #[tokio::test]
    async fn non_approved_payment_gets_none() {
        let (handler, invoices, _) = handler();
        let payment = payment(PaymentStatus::Rejected);

        let result = handler.emit_if_approved(&payment).await.unwrap();

        assert!(result.is_none());
        assert!(invoices
            .find_by_payment_id(&payment.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn second_trigger_is_a_noop_returning_the_same_invoice() {
        let (handler, invoices, payments) = handler();
        let payment = payment(PaymentStatus::Approved);
        payments.insert(payment.clone()).await.unwrap();

        let first = handler.emit_if_approved(&payment).await.unwrap().unwrap();
        let second = handler.emit_if_approved(&payment).await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(invoices.count().await, 1);
    }
}
