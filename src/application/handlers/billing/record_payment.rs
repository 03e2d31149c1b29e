//! RecordPaymentHandler - the payment recorder.
//!
//! Turns a provider-reported payment into at most one Payment row,
//! enforcing the amount/currency gate and promoting the subscription on
//! approval. Every step is idempotent: the same event delivered N times
//! produces exactly one row and at most one invoice.

use std::sync::Arc;

use crate::domain::billing::{
    BillingCycle, DecodedReference, ExternalReference, Invoice, Payment, PaymentStatus,
    Subscription, TransitionOutcome, WebhookError,
};
use crate::domain::foundation::{Currency, Money, PaymentId, Timestamp};
use crate::ports::{
    InvoiceRepository, PaymentInsert, PaymentRepository, PlanRepository, SubscriptionRepository,
};

use super::EmitInvoiceHandler;

/// A provider payment event to record.
#[derive(Debug, Clone)]
pub struct RecordPaymentCommand {
    /// Provider's payment id - the dedup key.
    pub provider_payment_id: String,
    /// Provider's status string ("approved", "rejected", ...).
    pub provider_status: String,
    /// Provider's failure detail, if any.
    pub status_detail: Option<String>,
    /// Reported amount in minor units.
    pub amount_minor: i64,
    /// Reported currency code.
    pub currency: String,
    /// Correlation token echoed by the provider, if present.
    pub external_reference: Option<String>,
    /// Preapproval the charge was made under, if the event shape carries it.
    pub preapproval_id: Option<String>,
    /// Raw provider payload for the audit trail.
    pub raw_payload: serde_json::Value,
}

/// Result of recording a payment event.
#[derive(Debug, Clone)]
pub enum RecordPaymentResult {
    /// First sighting: the payment was recorded.
    Recorded {
        payment: Payment,
        invoice: Option<Invoice>,
    },
    /// The provider payment id was already recorded; nothing changed.
    DuplicateNoop { payment: Payment },
}

/// Handler recording provider payment events idempotently.
pub struct RecordPaymentHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
    plans: Arc<dyn PlanRepository>,
    invoices: Arc<dyn InvoiceRepository>,
}

impl RecordPaymentHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRepository>,
        plans: Arc<dyn PlanRepository>,
        invoices: Arc<dyn InvoiceRepository>,
    ) -> Self {
        Self {
            subscriptions,
            payments,
            plans,
            invoices,
        }
    }

    pub async fn handle(
        &self,
        cmd: RecordPaymentCommand,
    ) -> Result<RecordPaymentResult, WebhookError> {
        // 1. Dedup short-circuit: at most one row per provider payment id.
        if let Some(existing) = self
            .payments
            .find_by_provider_payment_id(&cmd.provider_payment_id)
            .await?
        {
            tracing::debug!(
                provider_payment_id = %cmd.provider_payment_id,
                "payment already recorded, duplicate delivery"
            );
            return Ok(RecordPaymentResult::DuplicateNoop { payment: existing });
        }

        // 2. Validate the reported values before touching anything.
        let currency = Currency::new(&cmd.currency)
            .map_err(|e| WebhookError::Validation(e.to_string()))?;
        if cmd.amount_minor < 0 {
            return Err(WebhookError::Validation(format!(
                "negative amount {}",
                cmd.amount_minor
            )));
        }

        // 3. Correlate the event to a subscription.
        let subscription = self.resolve_subscription(&cmd).await?;

        // 4. Consistency gate against the plan's expected values.
        let plan = self.plans.find_by_id(&subscription.plan_id).await?;
        if let Some(plan) = &plan {
            plan.check_consistency(cmd.amount_minor, &currency)
                .map_err(|e| {
                    tracing::warn!(
                        provider_payment_id = %cmd.provider_payment_id,
                        subscription_id = %subscription.id,
                        error = %e,
                        "rejecting payment event: provider values contradict the plan"
                    );
                    WebhookError::Consistency(e)
                })?;
        } else {
            tracing::warn!(
                subscription_id = %subscription.id,
                plan_id = %subscription.plan_id,
                "plan not found, recording payment without consistency check"
            );
        }

        // 5. Insert the row. A lost uniqueness race is the dedup path.
        let now = Timestamp::now();
        let status = PaymentStatus::from_provider(&cmd.provider_status);
        let attempt = self
            .payments
            .list_for_subscription(&subscription.id)
            .await?
            .len() as u32
            + 1;
        let amount = Money::new(cmd.amount_minor, currency)
            .map_err(|e| WebhookError::Validation(e.to_string()))?;

        let payment = Payment::record(
            PaymentId::new(),
            subscription.id,
            subscription.subscriber_id,
            Some(cmd.provider_payment_id.clone()),
            status,
            amount,
            attempt,
            cmd.status_detail.clone(),
            cmd.raw_payload.clone(),
            now,
        );

        let payment = match self.payments.insert(payment).await? {
            PaymentInsert::Inserted(p) => p,
            PaymentInsert::Duplicate(p) => {
                tracing::debug!(
                    provider_payment_id = %cmd.provider_payment_id,
                    "lost the insert race to a concurrent delivery"
                );
                return Ok(RecordPaymentResult::DuplicateNoop { payment: p });
            }
        };

        tracing::info!(
            provider_payment_id = %cmd.provider_payment_id,
            subscription_id = %subscription.id,
            status = status.as_str(),
            amount = %payment.amount,
            "payment recorded"
        );

        // 6. On approval: promote the subscription and emit the invoice.
        let invoice = if status.is_approved() {
            self.apply_approval(subscription, &payment, now).await?
        } else {
            None
        };

        Ok(RecordPaymentResult::Recorded { payment, invoice })
    }

    /// Resolves the subscription from the external reference, falling back
    /// to the preapproval id when the reference is missing or stale.
    async fn resolve_subscription(
        &self,
        cmd: &RecordPaymentCommand,
    ) -> Result<Subscription, WebhookError> {
        if let Some(raw) = cmd.external_reference.as_deref() {
            match ExternalReference::decode(raw) {
                Ok(decoded) => {
                    if let Some(subscription) = self
                        .subscriptions
                        .find_by_id(&decoded.subscription_id())
                        .await?
                    {
                        if matches!(decoded, DecodedReference::Legacy { .. }) {
                            tracing::debug!(
                                subscription_id = %subscription.id,
                                "correlated via legacy external reference"
                            );
                        }
                        return Ok(subscription);
                    }
                    tracing::warn!(
                        subscription_id = %decoded.subscription_id(),
                        "external reference decoded but subscription not found, \
                         trying preapproval fallback"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        provider_payment_id = %cmd.provider_payment_id,
                        error = %e,
                        "undecodable external reference, trying preapproval fallback"
                    );
                }
            }
        }

        // Fallback correlation: some provider event shapes omit the
        // reference entirely. Bounded and logged - it masks a data-quality
        // issue upstream.
        if let Some(preapproval_id) = cmd.preapproval_id.as_deref() {
            if let Some(subscription) = self
                .subscriptions
                .find_by_preapproval_id(preapproval_id)
                .await?
            {
                tracing::warn!(
                    provider_payment_id = %cmd.provider_payment_id,
                    preapproval_id,
                    subscription_id = %subscription.id,
                    "correlated via preapproval id fallback"
                );
                return Ok(subscription);
            }
        }

        Err(WebhookError::Correlation(format!(
            "no subscription resolvable for payment {}",
            cmd.provider_payment_id
        )))
    }

    /// Applies the approval side effects: subscription activation and
    /// invoice emission.
    async fn apply_approval(
        &self,
        mut subscription: Subscription,
        payment: &Payment,
        now: Timestamp,
    ) -> Result<Option<Invoice>, WebhookError> {
        let cycle = match self.plans.find_by_id(&subscription.plan_id).await? {
            Some(plan) => plan.billing_cycle,
            None => BillingCycle::Monthly,
        };

        match subscription.mark_payment_approved(cycle, now) {
            TransitionOutcome::Applied => {
                self.subscriptions.update(&subscription).await?;
                tracing::info!(
                    subscription_id = %subscription.id,
                    "subscription activated by approved payment"
                );
            }
            TransitionOutcome::Noop => {}
            TransitionOutcome::IgnoredTerminal => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    status = ?subscription.status,
                    "approved payment against terminal subscription, state unchanged"
                );
            }
        }

        let emitter = EmitInvoiceHandler::new(self.invoices.clone(), self.payments.clone());
        emitter
            .emit_if_approved(payment)
            .await
            .map_err(|e| WebhookError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryInvoiceRepository, InMemoryPaymentRepository, InMemoryPlanRepository,
        InMemorySubscriptionRepository,
    };
    use crate::domain::billing::{BillingCycle, Plan, SubscriptionStatus};
    use crate::domain::foundation::{Money, PlanId, SubscriberId, SubscriptionId};

    struct Fixture {
        handler: RecordPaymentHandler,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        invoices: Arc<InMemoryInvoiceRepository>,
        plan: Plan,
        subscription: Subscription,
    }

    async fn fixture() -> Fixture {
        let clp = Currency::new("CLP").unwrap();
        let plan = Plan::new(
            PlanId::new(),
            "premium-monthly",
            "Premium",
            Money::new(9990, clp).unwrap(),
            BillingCycle::Monthly,
            0,
        )
        .unwrap();

        let mut subscription =
            Subscription::create(SubscriptionId::new(), SubscriberId::new(), plan.id);
        subscription.assign_preapproval("pre_1").unwrap();

        let plans = Arc::new(InMemoryPlanRepository::new());
        plans.save(&plan).await.unwrap();
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        subscriptions.save(&subscription).await.unwrap();
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let invoices = Arc::new(InMemoryInvoiceRepository::new());

        let handler = RecordPaymentHandler::new(
            subscriptions.clone(),
            payments.clone(),
            plans.clone(),
            invoices.clone(),
        );

        Fixture {
            handler,
            subscriptions,
            payments,
            invoices,
            plan,
            subscription,
        }
    }

    fn approved_command(fx: &Fixture) -> RecordPaymentCommand {
        let reference = ExternalReference {
            subscriber_id: fx.subscription.subscriber_id,
            subscription_id: fx.subscription.id,
            expected_amount_minor: 9990,
            expected_currency: fx.plan.price.currency,
            plan_code: fx.plan.code.clone(),
        };
        RecordPaymentCommand {
            provider_payment_id: "PAY1".to_string(),
            provider_status: "approved".to_string(),
            status_detail: None,
            amount_minor: 9990,
            currency: "CLP".to_string(),
            external_reference: Some(reference.encode()),
            preapproval_id: Some("pre_1".to_string()),
            raw_payload: serde_json::json!({"id": "PAY1"}),
        }
    }

    #[tokio::test]
    async fn approved_event_records_payment_and_invoice_and_activates() {
        let fx = fixture().await;

        let result = fx.handler.handle(approved_command(&fx)).await.unwrap();

        let RecordPaymentResult::Recorded { payment, invoice } = result else {
            panic!("expected Recorded");
        };
        assert_eq!(payment.status, PaymentStatus::Approved);
        assert!(payment.paid_at.is_some());
        assert!(invoice.is_some());

        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn delivering_the_same_event_twice_keeps_one_payment_one_invoice() {
        let fx = fixture().await;

        fx.handler.handle(approved_command(&fx)).await.unwrap();
        let second = fx.handler.handle(approved_command(&fx)).await.unwrap();

        assert!(matches!(second, RecordPaymentResult::DuplicateNoop { .. }));
        assert_eq!(fx.payments.count().await, 1);
        assert_eq!(fx.invoices.count().await, 1);
    }

    #[tokio::test]
    async fn amount_mismatch_records_nothing() {
        let fx = fixture().await;
        let mut cmd = approved_command(&fx);
        cmd.amount_minor = 5000;

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert_eq!(err.code(), "amount_mismatch");
        assert_eq!(fx.payments.count().await, 0);
        assert_eq!(fx.invoices.count().await, 0);

        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn currency_mismatch_records_nothing() {
        let fx = fixture().await;
        let mut cmd = approved_command(&fx);
        cmd.currency = "USD".to_string();

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert_eq!(err.code(), "currency_mismatch");
        assert_eq!(fx.payments.count().await, 0);
    }

    #[tokio::test]
    async fn rejected_event_records_payment_without_invoice_or_activation() {
        let fx = fixture().await;
        let mut cmd = approved_command(&fx);
        cmd.provider_status = "rejected".to_string();
        cmd.status_detail = Some("cc_rejected_insufficient_amount".to_string());

        let result = fx.handler.handle(cmd).await.unwrap();

        let RecordPaymentResult::Recorded { payment, invoice } = result else {
            panic!("expected Recorded");
        };
        assert_eq!(payment.status, PaymentStatus::Rejected);
        assert!(payment.paid_at.is_none());
        assert!(invoice.is_none());

        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn missing_reference_falls_back_to_preapproval_id() {
        let fx = fixture().await;
        let mut cmd = approved_command(&fx);
        cmd.external_reference = None;

        let result = fx.handler.handle(cmd).await.unwrap();
        assert!(matches!(result, RecordPaymentResult::Recorded { .. }));
    }

    #[tokio::test]
    async fn unresolvable_event_is_a_correlation_failure() {
        let fx = fixture().await;
        let mut cmd = approved_command(&fx);
        cmd.external_reference = Some("garbage-token".to_string());
        cmd.preapproval_id = Some("pre_unknown".to_string());

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, WebhookError::Correlation(_)));
        assert!(err.is_retry_productive());
        assert_eq!(fx.payments.count().await, 0);
    }

    #[tokio::test]
    async fn legacy_reference_still_correlates() {
        let fx = fixture().await;
        let mut cmd = approved_command(&fx);
        cmd.external_reference = Some(format!(
            "{}:{}",
            fx.subscription.subscriber_id, fx.subscription.id
        ));

        let result = fx.handler.handle(cmd).await.unwrap();
        assert!(matches!(result, RecordPaymentResult::Recorded { .. }));
    }

    #[tokio::test]
    async fn second_payment_gets_attempt_number_two() {
        let fx = fixture().await;
        fx.handler.handle(approved_command(&fx)).await.unwrap();

        let mut cmd = approved_command(&fx);
        cmd.provider_payment_id = "PAY2".to_string();
        let result = fx.handler.handle(cmd).await.unwrap();

        let RecordPaymentResult::Recorded { payment, .. } = result else {
            panic!("expected Recorded");
        };
        assert_eq!(payment.attempt, 2);
    }

    #[tokio::test]
    async fn approved_event_against_cancelled_subscription_still_records_but_does_not_revive() {
        let fx = fixture().await;
        let mut sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        sub.cancel("subscriber request", Timestamp::now());
        fx.subscriptions.update(&sub).await.unwrap();

        let result = fx.handler.handle(approved_command(&fx)).await.unwrap();

        // The money moved, so the ledger records it; the terminal
        // subscription stays terminal.
        assert!(matches!(result, RecordPaymentResult::Recorded { .. }));
        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }
}
