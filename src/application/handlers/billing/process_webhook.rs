//! ProcessWebhookHandler - the webhook ingestion entry point.
//!
//! Per-request state machine:
//!
//! ```text
//! received -> verified -> processed
//! received -> rejected            (auth/parse failure, nothing written)
//! received -> verified -> error   (recorded, marked errored)
//! ```
//!
//! The raw event is persisted write-ahead as soon as it is verified, so a
//! crash mid-processing leaves a replayable record, and the unique event
//! id short-circuits duplicate deliveries. Once verified, processing runs
//! to completion - the record is marked processed (success or error text)
//! exactly once at the end, whatever happens in between.

use std::sync::Arc;

use crate::domain::billing::{
    BillingCycle, EventTopic, ProviderEvent, Subscription, TransitionOutcome, WebhookError,
    WebhookSignatureVerifier,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    PaymentProvider, PlanRepository, PreapprovalStatus, ProcessingOutcome, SaveResult,
    SubscriptionRepository, WebhookEventRecord, WebhookEventRepository,
};

use super::{RecordPaymentCommand, RecordPaymentHandler};

/// Provider name stamped into the ingestion log.
const PROVIDER_NAME: &str = "mercadopago";

/// A raw webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw request body.
    pub body: Vec<u8>,
    /// Signature header value, if sent.
    pub signature_header: Option<String>,
    /// Provider's request id header, if sent.
    pub request_id: Option<String>,
    /// `data.id` query parameter (legacy envelopes carry it there).
    pub data_id_hint: Option<String>,
}

/// Result of processing a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessWebhookResult {
    /// The event was processed.
    Processed,
    /// The event id was already in the ingestion log.
    AlreadyProcessed,
    /// The topic has no handler; acknowledged and logged only.
    Ignored,
}

/// Handler for inbound webhooks.
pub struct ProcessWebhookHandler {
    events: Arc<dyn WebhookEventRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    provider: Arc<dyn PaymentProvider>,
    verifier: Arc<WebhookSignatureVerifier>,
    recorder: Arc<RecordPaymentHandler>,
}

impl ProcessWebhookHandler {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        provider: Arc<dyn PaymentProvider>,
        verifier: Arc<WebhookSignatureVerifier>,
        recorder: Arc<RecordPaymentHandler>,
    ) -> Self {
        Self {
            events,
            subscriptions,
            plans,
            provider,
            verifier,
            recorder,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        // Parse first: the data id is part of the signature manifest.
        let event = ProviderEvent::parse(&cmd.body, cmd.data_id_hint.as_deref())?;

        // Hard gate: nothing of this delivery is processed unverified.
        self.verifier.verify(
            &event.data_id,
            cmd.request_id.as_deref().unwrap_or_default(),
            cmd.signature_header.as_deref(),
        )?;

        // Write-ahead log; the unique event id dedups deliveries.
        let payload =
            serde_json::from_slice(&cmd.body).unwrap_or(serde_json::Value::Null);
        let record = WebhookEventRecord::received(
            PROVIDER_NAME,
            event.topic.as_str(),
            &event.data_id,
            &event.event_id,
            payload,
        );
        if self.events.record_received(record).await? == SaveResult::AlreadyExists {
            tracing::debug!(event_id = %event.event_id, "duplicate webhook delivery");
            return Ok(ProcessWebhookResult::AlreadyProcessed);
        }

        // From here on the outcome is always written back to the log,
        // exactly once, success or failure.
        let result = self.dispatch(&event).await;

        let outcome = match &result {
            Ok(_) => ProcessingOutcome::Succeeded,
            Err(WebhookError::Ignored(_)) => ProcessingOutcome::Succeeded,
            Err(e) => ProcessingOutcome::Failed(format!("{}: {}", e.code(), e)),
        };
        self.events.mark_processed(&event.event_id, outcome).await?;

        match result {
            Err(WebhookError::Ignored(reason)) => {
                tracing::debug!(event_id = %event.event_id, reason = %reason, "webhook ignored");
                Ok(ProcessWebhookResult::Ignored)
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id,
                    error = %e,
                    retry_productive = e.is_retry_productive(),
                    "webhook processing failed"
                );
                Err(e)
            }
            Ok(r) => Ok(r),
        }
    }

    async fn dispatch(&self, event: &ProviderEvent) -> Result<ProcessWebhookResult, WebhookError> {
        match &event.topic {
            EventTopic::Payment => self.handle_payment_event(event).await,
            EventTopic::Preapproval => self.handle_preapproval_event(event).await,
            EventTopic::Unknown(topic) => {
                Err(WebhookError::Ignored(format!("no handler for topic {}", topic)))
            }
        }
    }

    /// The webhook body only names the payment; the authoritative values
    /// come from the provider API, then flow through the payment recorder.
    async fn handle_payment_event(
        &self,
        event: &ProviderEvent,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        let payment = self
            .provider
            .get_payment(&event.data_id)
            .await
            .map_err(|e| WebhookError::Downstream(e.to_string()))?
            .ok_or_else(|| {
                // The provider may not expose the payment yet; redelivery
                // can succeed.
                WebhookError::Correlation(format!(
                    "payment {} not found at provider",
                    event.data_id
                ))
            })?;

        let cmd = RecordPaymentCommand {
            provider_payment_id: payment.id,
            provider_status: payment.status,
            status_detail: payment.status_detail,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            external_reference: payment.external_reference,
            preapproval_id: payment.preapproval_id,
            raw_payload: payment.raw,
        };
        self.recorder.handle(cmd).await?;
        Ok(ProcessWebhookResult::Processed)
    }

    /// Preapproval events synchronize mandate status changes made
    /// provider-side (authorization without a redirect, pauses,
    /// cancellations from the provider's own UI).
    async fn handle_preapproval_event(
        &self,
        event: &ProviderEvent,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        let preapproval = self
            .provider
            .get_preapproval(&event.data_id)
            .await
            .map_err(|e| WebhookError::Downstream(e.to_string()))?
            .ok_or_else(|| {
                WebhookError::Correlation(format!(
                    "preapproval {} not found at provider",
                    event.data_id
                ))
            })?;

        let mut subscription = self
            .subscriptions
            .find_by_preapproval_id(&preapproval.id)
            .await?
            .ok_or_else(|| {
                WebhookError::Correlation(format!(
                    "no subscription bound to preapproval {}",
                    preapproval.id
                ))
            })?;

        let outcome = match preapproval.status {
            PreapprovalStatus::Authorized => {
                let cycle = self.billing_cycle_for(&subscription).await?;
                subscription.confirm_authorization("authorized", cycle, Timestamp::now())
            }
            PreapprovalStatus::Cancelled => {
                subscription.cancel("cancelled at provider", Timestamp::now())
            }
            PreapprovalStatus::Paused => match subscription.pause() {
                Ok(()) => TransitionOutcome::Applied,
                // Pausing a not-yet-active subscription has nothing to do.
                Err(_) => TransitionOutcome::Noop,
            },
            PreapprovalStatus::Pending | PreapprovalStatus::Unknown(_) => TransitionOutcome::Noop,
        };

        if outcome == TransitionOutcome::Applied {
            self.subscriptions.update(&subscription).await?;
            tracing::info!(
                subscription_id = %subscription.id,
                preapproval_status = ?preapproval.status,
                "subscription synchronized from preapproval event"
            );
        }
        Ok(ProcessWebhookResult::Processed)
    }

    async fn billing_cycle_for(
        &self,
        subscription: &Subscription,
    ) -> Result<BillingCycle, WebhookError> {
        Ok(self
            .plans
            .find_by_id(&subscription.plan_id)
            .await?
            .map(|p| p.billing_cycle)
            .unwrap_or(BillingCycle::Monthly))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryInvoiceRepository, InMemoryPaymentRepository, InMemoryPlanRepository,
        InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
    };
    use crate::adapters::mercadopago::MockPaymentProvider;
    use crate::domain::billing::{
        BillingCycle, ExternalReference, Plan, Subscription, SubscriptionStatus,
    };
    use crate::domain::foundation::{
        Currency, Money, PlanId, SubscriberId, SubscriptionId,
    };
    use crate::ports::ProviderPayment;

    struct Fixture {
        handler: ProcessWebhookHandler,
        events: Arc<InMemoryWebhookEventRepository>,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        invoices: Arc<InMemoryInvoiceRepository>,
        provider: Arc<MockPaymentProvider>,
        subscription: Subscription,
        reference: String,
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
        let plans = Arc::new(InMemoryPlanRepository::new());
        plans.save(&plan).await.unwrap();

        let mut subscription =
            Subscription::create(SubscriptionId::new(), SubscriberId::new(), plan.id);
        subscription.assign_preapproval("pre_1").unwrap();
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        subscriptions.save(&subscription).await.unwrap();

        let reference = ExternalReference {
            subscriber_id: subscription.subscriber_id,
            subscription_id: subscription.id,
            expected_amount_minor: 9990,
            expected_currency: clp,
            plan_code: plan.code.clone(),
        }
        .encode();

        let payments = Arc::new(InMemoryPaymentRepository::new());
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let provider = Arc::new(MockPaymentProvider::new());

        let recorder = Arc::new(RecordPaymentHandler::new(
            subscriptions.clone(),
            payments.clone(),
            plans.clone(),
            invoices.clone(),
        ));
        // No secret configured, non-production: verification bypassed.
        let verifier = Arc::new(WebhookSignatureVerifier::new(None, false));
        let handler = ProcessWebhookHandler::new(
            events.clone(),
            subscriptions.clone(),
            plans,
            provider.clone(),
            verifier,
            recorder,
        );

        Fixture {
            handler,
            events,
            subscriptions,
            payments,
            invoices,
            provider,
            subscription,
            reference,
        }
    }

    fn payment_body(payment_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": format!("evt-{}", payment_id),
            "type": "payment",
            "data": {"id": payment_id}
        }))
        .unwrap()
    }

    fn command(body: Vec<u8>) -> ProcessWebhookCommand {
        ProcessWebhookCommand {
            body,
            signature_header: None,
            request_id: Some("req-1".to_string()),
            data_id_hint: None,
        }
    }

    fn seed_approved_payment(fx: &Fixture, id: &str) {
        fx.provider.seed_payment(ProviderPayment {
            id: id.to_string(),
            status: "approved".to_string(),
            status_detail: Some("accredited".to_string()),
            amount_minor: 9990,
            currency: "CLP".to_string(),
            external_reference: Some(fx.reference.clone()),
            preapproval_id: Some("pre_1".to_string()),
            raw: serde_json::json!({"id": id}),
        });
    }

    #[tokio::test]
    async fn payment_webhook_records_and_activates_and_logs() {
        let fx = fixture().await;
        seed_approved_payment(&fx, "PAY1");

        let result = fx.handler.handle(command(payment_body("PAY1"))).await.unwrap();

        assert_eq!(result, ProcessWebhookResult::Processed);
        assert_eq!(fx.payments.count().await, 1);
        assert_eq!(fx.invoices.count().await, 1);

        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);

        let record = fx
            .events
            .find_by_event_id("evt-PAY1")
            .await
            .unwrap()
            .unwrap();
        assert!(record.processed);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn duplicate_delivery_short_circuits_before_processing() {
        let fx = fixture().await;
        seed_approved_payment(&fx, "PAY1");

        fx.handler.handle(command(payment_body("PAY1"))).await.unwrap();
        let second = fx.handler.handle(command(payment_body("PAY1"))).await.unwrap();

        assert_eq!(second, ProcessWebhookResult::AlreadyProcessed);
        assert_eq!(fx.payments.count().await, 1);
        assert_eq!(fx.invoices.count().await, 1);
    }

    #[tokio::test]
    async fn amount_mismatch_marks_event_errored_and_records_no_payment() {
        let fx = fixture().await;
        fx.provider.seed_payment(ProviderPayment {
            id: "PAY1".to_string(),
            status: "approved".to_string(),
            status_detail: None,
            amount_minor: 5000, // plan expects 9990
            currency: "CLP".to_string(),
            external_reference: Some(fx.reference.clone()),
            preapproval_id: Some("pre_1".to_string()),
            raw: serde_json::json!({}),
        });

        let err = fx
            .handler
            .handle(command(payment_body("PAY1")))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "amount_mismatch");
        assert!(!err.is_retry_productive());
        assert_eq!(fx.payments.count().await, 0);

        let record = fx
            .events
            .find_by_event_id("evt-PAY1")
            .await
            .unwrap()
            .unwrap();
        assert!(record.processed);
        assert!(record.error.as_deref().unwrap().contains("amount_mismatch"));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_logging() {
        let fx = fixture().await;

        let err = fx
            .handler
            .handle(command(b"not json".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Malformed(_)));
        assert_eq!(fx.events.count().await, 0);
    }

    #[tokio::test]
    async fn invalid_signature_never_reaches_the_recorder() {
        let fx = fixture().await;
        seed_approved_payment(&fx, "PAY1");

        // Swap in a verifier with a configured secret; the command has no
        // signature header.
        let verifier = Arc::new(WebhookSignatureVerifier::new(
            Some(secrecy::SecretString::new("secret".to_string())),
            false,
        ));
        let plans = Arc::new(InMemoryPlanRepository::new());
        let handler = ProcessWebhookHandler::new(
            fx.events.clone(),
            fx.subscriptions.clone(),
            plans.clone(),
            fx.provider.clone(),
            verifier,
            Arc::new(RecordPaymentHandler::new(
                fx.subscriptions.clone(),
                fx.payments.clone(),
                plans,
                fx.invoices.clone(),
            )),
        );

        let err = handler.handle(command(payment_body("PAY1"))).await.unwrap_err();

        assert!(matches!(err, WebhookError::Authentication(_)));
        assert_eq!(fx.payments.count().await, 0);
        // Rejected before the write-ahead record.
        assert_eq!(fx.events.count().await, 0);
    }

    #[tokio::test]
    async fn unknown_topic_is_acknowledged_and_logged() {
        let fx = fixture().await;
        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt-x",
            "type": "test_topic",
            "data": {"id": "X1"}
        }))
        .unwrap();

        let result = fx.handler.handle(command(body)).await.unwrap();

        assert_eq!(result, ProcessWebhookResult::Ignored);
        let record = fx.events.find_by_event_id("evt-x").await.unwrap().unwrap();
        assert!(record.processed);
    }

    #[tokio::test]
    async fn payment_missing_at_provider_is_retryable_and_marked_errored() {
        let fx = fixture().await;

        let err = fx
            .handler
            .handle(command(payment_body("PAY_GHOST")))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Correlation(_)));
        assert!(err.is_retry_productive());
        let record = fx
            .events
            .find_by_event_id("evt-PAY_GHOST")
            .await
            .unwrap()
            .unwrap();
        assert!(record.processed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn preapproval_authorized_event_confirms_subscription() {
        let fx = fixture().await;
        fx.provider.seed_preapproval_with_id("pre_1", "authorized");
        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt-pre",
            "type": "preapproval",
            "data": {"id": "pre_1"}
        }))
        .unwrap();

        let result = fx.handler.handle(command(body)).await.unwrap();

        assert_eq!(result, ProcessWebhookResult::Processed);
        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Authorized);
    }

    #[tokio::test]
    async fn preapproval_cancelled_event_cancels_subscription() {
        let fx = fixture().await;
        fx.provider.seed_preapproval_with_id("pre_1", "cancelled");
        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt-pre-c",
            "type": "preapproval",
            "data": {"id": "pre_1"}
        }))
        .unwrap();

        fx.handler.handle(command(body)).await.unwrap();

        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }
}
