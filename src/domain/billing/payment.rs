//! Payment entity.
//!
//! A Payment records one provider-reported payment attempt against a
//! subscription. The provider payment id is the primary dedup key: at most
//! one row per provider payment id, regardless of how many times the event
//! is delivered.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    InvoiceId, Money, PaymentId, SubscriberId, SubscriptionId, Timestamp,
};

/// Provider-reported payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Authorized,
    InProcess,
    Rejected,
    Refunded,
    Chargeback,
    Cancelled,
}

impl PaymentStatus {
    /// Parses the provider's status string.
    ///
    /// Unknown statuses map to `Pending` so an unrecognized event is held
    /// rather than dropped or treated as money received.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "approved" => PaymentStatus::Approved,
            "authorized" => PaymentStatus::Authorized,
            "in_process" | "in_mediation" => PaymentStatus::InProcess,
            "rejected" => PaymentStatus::Rejected,
            "refunded" => PaymentStatus::Refunded,
            "charged_back" | "chargeback" => PaymentStatus::Chargeback,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Pending,
        }
    }

    /// True once no further provider transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Rejected
                | PaymentStatus::Refunded
                | PaymentStatus::Chargeback
                | PaymentStatus::Cancelled
        )
    }

    /// True if this status represents money received.
    pub fn is_approved(&self) -> bool {
        matches!(self, PaymentStatus::Approved)
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Chargeback => "chargeback",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// A recorded payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier.
    pub id: PaymentId,

    /// Subscription this payment belongs to.
    pub subscription_id: SubscriptionId,

    /// Subscriber who was charged.
    pub subscriber_id: SubscriberId,

    /// Provider's payment id; unique when present.
    pub provider_payment_id: Option<String>,

    /// Status as last reported by the provider.
    pub status: PaymentStatus,

    /// Charged amount.
    pub amount: Money,

    /// Which attempt in the retry sequence this was.
    pub attempt: u32,

    /// When the payment was approved.
    pub paid_at: Option<Timestamp>,

    /// Provider's rejection/failure detail, if any.
    pub failure_reason: Option<String>,

    /// Raw provider payload, kept opaque for audit and replay.
    pub raw_payload: serde_json::Value,

    /// Invoice issued for this payment, once emitted.
    pub invoice_id: Option<InvoiceId>,

    /// When the row was created.
    pub created_at: Timestamp,
}

impl Payment {
    /// Records a payment attempt on first sighting of a provider event.
    ///
    /// Approved payments are stamped with `paid_at` at record time.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        id: PaymentId,
        subscription_id: SubscriptionId,
        subscriber_id: SubscriberId,
        provider_payment_id: Option<String>,
        status: PaymentStatus,
        amount: Money,
        attempt: u32,
        failure_reason: Option<String>,
        raw_payload: serde_json::Value,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            subscription_id,
            subscriber_id,
            provider_payment_id,
            status,
            amount,
            attempt,
            paid_at: status.is_approved().then_some(now),
            failure_reason,
            raw_payload,
            invoice_id: None,
            created_at: now,
        }
    }

    /// Links the emitted invoice.
    ///
    /// The only mutation permitted on a terminal payment.
    pub fn attach_invoice(&mut self, invoice_id: InvoiceId) {
        self.invoice_id = Some(invoice_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Currency;

    fn amount() -> Money {
        Money::new(9990, Currency::new("CLP").unwrap()).unwrap()
    }

    fn record(status: PaymentStatus) -> Payment {
        Payment::record(
            PaymentId::new(),
            SubscriptionId::new(),
            SubscriberId::new(),
            Some("PAY1".to_string()),
            status,
            amount(),
            1,
            None,
            serde_json::json!({"id": "PAY1"}),
            Timestamp::now(),
        )
    }

    #[test]
    fn approved_payment_gets_paid_at() {
        let payment = record(PaymentStatus::Approved);
        assert!(payment.paid_at.is_some());
    }

    #[test]
    fn pending_payment_has_no_paid_at() {
        let payment = record(PaymentStatus::Pending);
        assert!(payment.paid_at.is_none());
    }

    #[test]
    fn provider_status_parsing() {
        assert_eq!(
            PaymentStatus::from_provider("approved"),
            PaymentStatus::Approved
        );
        assert_eq!(
            PaymentStatus::from_provider("charged_back"),
            PaymentStatus::Chargeback
        );
        assert_eq!(
            PaymentStatus::from_provider("in_mediation"),
            PaymentStatus::InProcess
        );
        // Unknown statuses hold, not drop.
        assert_eq!(
            PaymentStatus::from_provider("something_new"),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(PaymentStatus::Approved.is_terminal());
        assert!(PaymentStatus::Rejected.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::InProcess.is_terminal());
        assert!(!PaymentStatus::Authorized.is_terminal());
    }

    #[test]
    fn attach_invoice_links_once() {
        let mut payment = record(PaymentStatus::Approved);
        let invoice_id = InvoiceId::new();
        payment.attach_invoice(invoice_id);
        assert_eq!(payment.invoice_id, Some(invoice_id));
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Approved,
            PaymentStatus::Authorized,
            PaymentStatus::InProcess,
            PaymentStatus::Rejected,
            PaymentStatus::Refunded,
            PaymentStatus::Chargeback,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(PaymentStatus::from_provider(status.as_str()), status);
        }
    }
}
