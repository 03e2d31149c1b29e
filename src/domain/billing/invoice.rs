//! Invoice entity.
//!
//! Exactly one invoice per approved payment. Document rendering is an
//! external collaborator; this entity only fixes the number, the tax
//! split, and the document path reference.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Currency, InvoiceId, PaymentId, Timestamp};

use super::Payment;

/// Default VAT rate in basis points (19%).
const DEFAULT_TAX_RATE_BPS: i64 = 1900;

/// An issued invoice, 1:1 with an approved payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier.
    pub id: InvoiceId,

    /// Payment this invoice covers (unique).
    pub payment_id: PaymentId,

    /// Human-facing invoice number, derived from issue time + payment id.
    pub number: String,

    /// Where the rendered document will live.
    pub document_path: String,

    /// When the invoice was issued.
    pub issued_at: Timestamp,

    /// Net amount in minor units.
    pub net_minor: i64,

    /// Tax amount in minor units.
    pub tax_minor: i64,

    /// Total amount in minor units (net + tax).
    pub total_minor: i64,

    /// Currency of all amounts.
    pub currency: Currency,
}

impl Invoice {
    /// Builds the invoice for an approved payment with the default tax rate.
    pub fn for_payment(payment: &Payment, issued_at: Timestamp) -> Self {
        Self::for_payment_with_tax(payment, issued_at, DEFAULT_TAX_RATE_BPS)
    }

    /// Builds the invoice with an explicit tax rate in basis points.
    ///
    /// The charged amount is tax-inclusive: net is derived by dividing the
    /// total out, tax is the remainder, so net + tax always reconstructs
    /// the total exactly.
    pub fn for_payment_with_tax(payment: &Payment, issued_at: Timestamp, tax_rate_bps: i64) -> Self {
        let id = InvoiceId::new();
        let total = payment.amount.amount_minor;
        let net = total * 10_000 / (10_000 + tax_rate_bps);
        let tax = total - net;

        let number = Self::derive_number(issued_at, &payment.id);
        let document_path = format!("invoices/{}.pdf", number);

        Self {
            id,
            payment_id: payment.id,
            number,
            document_path,
            issued_at,
            net_minor: net,
            tax_minor: tax,
            total_minor: total,
            currency: payment.amount.currency,
        }
    }

    /// Deterministic-enough invoice number: issue time plus a payment id
    /// prefix. Uniqueness is guaranteed by the 1:1 payment link, not by
    /// this string.
    fn derive_number(issued_at: Timestamp, payment_id: &PaymentId) -> String {
        let id_prefix: String = payment_id
            .to_string()
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .take(8)
            .collect();
        format!("INV-{}-{}", issued_at.as_unix_secs(), id_prefix)
    }
}
