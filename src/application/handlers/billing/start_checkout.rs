//! StartCheckoutHandler - begin or resume a subscription checkout.
//!
//! Idempotent by construction: a subscription that already holds a
//! preapproval id never gets a second provider resource - the existing
//! checkout URL is fetched and returned. Two concurrent first calls
//! resolve through the storage claim on the preapproval id; the loser
//! re-reads and returns the winner's record.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, ExternalReference, IdempotencyKey, Plan, Subscription,
};
use crate::domain::foundation::{SubscriberId, SubscriptionId};
use crate::ports::{
    ClaimOutcome, CreatePreapprovalRequest, PaymentProvider, PlanRepository,
    SubscriptionRepository,
};

/// Command to start or resume checkout for a plan.
#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    /// The authenticated subscriber.
    pub subscriber_id: SubscriberId,
    /// Email for checkout pre-fill.
    pub email: String,
    /// Plan to subscribe to.
    pub plan_code: String,
    /// Where the provider should send the browser back to.
    pub back_url: String,
}

/// Result of starting checkout.
#[derive(Debug, Clone)]
pub struct StartCheckoutResult {
    pub subscription_id: SubscriptionId,
    pub preapproval_id: String,
    /// URL to send the subscriber's browser to.
    pub checkout_url: String,
    /// True when an existing preapproval was returned instead of created.
    pub resumed: bool,
}

/// Handler for the start-checkout endpoint.
pub struct StartCheckoutHandler {
    plans: Arc<dyn PlanRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    provider: Arc<dyn PaymentProvider>,
}

impl StartCheckoutHandler {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            plans,
            subscriptions,
            provider,
        }
    }

    pub async fn handle(
        &self,
        cmd: StartCheckoutCommand,
    ) -> Result<StartCheckoutResult, BillingError> {
        let plan = self
            .plans
            .find_by_code(&cmd.plan_code)
            .await?
            .ok_or_else(|| BillingError::plan_not_found(&cmd.plan_code))?;
        if !plan.active {
            return Err(BillingError::plan_inactive(&plan.code));
        }

        let subscription = self.find_or_create_subscription(&cmd, &plan).await?;

        // Idempotent start: an existing preapproval is resumed, never
        // duplicated.
        if let Some(preapproval_id) = subscription.preapproval_id.clone() {
            return self.resume(subscription.id, preapproval_id).await;
        }

        let reference = ExternalReference {
            subscriber_id: cmd.subscriber_id,
            subscription_id: subscription.id,
            expected_amount_minor: plan.price.amount_minor,
            expected_currency: plan.price.currency,
            plan_code: plan.code.clone(),
        };
        let idempotency_key =
            IdempotencyKey::for_checkout(&subscription.id, &cmd.subscriber_id, &plan.id);

        let request = CreatePreapprovalRequest {
            reason: plan.name.clone(),
            payer_email: cmd.email.clone(),
            amount_minor: plan.price.amount_minor,
            currency: plan.price.currency.to_string(),
            frequency_months: plan.billing_cycle.months(),
            external_reference: reference.encode(),
            back_url: cmd.back_url.clone(),
            idempotency_key: idempotency_key.as_str().to_string(),
        };

        let preapproval = self
            .provider
            .create_preapproval(request)
            .await
            .map_err(|e| BillingError::provider_failed(e.to_string(), e.retryable))?;

        match self
            .subscriptions
            .claim_preapproval(&subscription.id, &preapproval.id)
            .await?
        {
            ClaimOutcome::Claimed => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    preapproval_id = %preapproval.id,
                    "checkout started"
                );
                Ok(StartCheckoutResult {
                    subscription_id: subscription.id,
                    preapproval_id: preapproval.id,
                    checkout_url: preapproval.init_point,
                    resumed: false,
                })
            }
            ClaimOutcome::AlreadyClaimed(winner) => {
                // A concurrent call won the race; discard our provider
                // resource reference and return the winner's.
                let winner_preapproval_id = winner
                    .preapproval_id
                    .clone()
                    .ok_or_else(|| BillingError::infrastructure("claim winner lost its id"))?;
                tracing::warn!(
                    subscription_id = %subscription.id,
                    ours = %preapproval.id,
                    winner = %winner_preapproval_id,
                    "lost the preapproval claim race, resuming the winner's checkout"
                );
                self.resume(subscription.id, winner_preapproval_id).await
            }
        }
    }

    async fn find_or_create_subscription(
        &self,
        cmd: &StartCheckoutCommand,
        plan: &Plan,
    ) -> Result<Subscription, BillingError> {
        if let Some(existing) = self
            .subscriptions
            .find_by_subscriber_and_plan(&cmd.subscriber_id, &plan.id)
            .await?
        {
            // Terminal subscriptions never transition; resubscribing
            // creates a fresh row.
            use crate::domain::foundation::StateMachine;
            if !existing.status.is_terminal() {
                return Ok(existing);
            }
        }

        let subscription =
            Subscription::create(SubscriptionId::new(), cmd.subscriber_id, plan.id);
        self.subscriptions.save(&subscription).await?;
        Ok(subscription)
    }

    async fn resume(
        &self,
        subscription_id: SubscriptionId,
        preapproval_id: String,
    ) -> Result<StartCheckoutResult, BillingError> {
        let preapproval = self
            .provider
            .get_preapproval(&preapproval_id)
            .await
            .map_err(|e| BillingError::provider_failed(e.to_string(), e.retryable))?
            .ok_or_else(|| {
                BillingError::provider_failed(
                    format!("preapproval {} not found at provider", preapproval_id),
                    false,
                )
            })?;

        Ok(StartCheckoutResult {
            subscription_id,
            preapproval_id,
            checkout_url: preapproval.init_point,
            resumed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPlanRepository, InMemorySubscriptionRepository};
    use crate::adapters::mercadopago::MockPaymentProvider;
    use crate::domain::billing::BillingCycle;
    use crate::domain::foundation::{Currency, Money, PlanId, Timestamp};

    async fn fixture() -> (
        StartCheckoutHandler,
        Arc<InMemorySubscriptionRepository>,
        Arc<MockPaymentProvider>,
        Plan,
    ) {
        let plan = Plan::new(
            PlanId::new(),
            "premium-monthly",
            "Premium",
            Money::new(9990, Currency::new("CLP").unwrap()).unwrap(),
            BillingCycle::Monthly,
            0,
        )
        .unwrap();

        let plans = Arc::new(InMemoryPlanRepository::new());
        plans.save(&plan).await.unwrap();
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let provider = Arc::new(MockPaymentProvider::new());

        let handler =
            StartCheckoutHandler::new(plans, subscriptions.clone(), provider.clone());
        (handler, subscriptions, provider, plan)
    }

    fn command() -> StartCheckoutCommand {
        StartCheckoutCommand {
            subscriber_id: SubscriberId::new(),
            email: "ana@example.com".to_string(),
            plan_code: "premium-monthly".to_string(),
            back_url: "https://app.example.com/callbacks/payment".to_string(),
        }
    }

    #[tokio::test]
    async fn first_checkout_creates_subscription_and_preapproval() {
        let (handler, subscriptions, provider, _) = fixture().await;

        let result = handler.handle(command()).await.unwrap();

        assert!(!result.resumed);
        assert!(!result.checkout_url.is_empty());
        let sub = subscriptions
            .find_by_id(&result.subscription_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.preapproval_id.as_deref(), Some(result.preapproval_id.as_str()));
        assert_eq!(provider.preapproval_count(), 1);
    }

    #[tokio::test]
    async fn second_checkout_resumes_the_same_preapproval() {
        let (handler, _, provider, _) = fixture().await;
        let cmd = command();

        let first = handler.handle(cmd.clone()).await.unwrap();
        let second = handler.handle(cmd).await.unwrap();

        assert!(second.resumed);
        assert_eq!(first.preapproval_id, second.preapproval_id);
        assert_eq!(first.subscription_id, second.subscription_id);
        // Exactly one provider resource ever created.
        assert_eq!(provider.preapproval_count(), 1);
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let (handler, _, _, _) = fixture().await;
        let mut cmd = command();
        cmd.plan_code = "nope".to_string();

        let err = handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, BillingError::PlanNotFound(_)));
    }

    #[tokio::test]
    async fn inactive_plan_is_rejected() {
        let (_, _, _, plan) = fixture().await;
        let mut closed = plan;
        closed.active = false;

        let plans = Arc::new(InMemoryPlanRepository::new());
        plans.save(&closed).await.unwrap();
        let handler = StartCheckoutHandler::new(
            plans,
            Arc::new(InMemorySubscriptionRepository::new()),
            Arc::new(MockPaymentProvider::new()),
        );

        let err = handler.handle(command()).await.unwrap_err();
        assert!(matches!(err, BillingError::PlanInactive(_)));
    }

    #[tokio::test]
    async fn provider_failure_surfaces_without_local_state() {
        let plan = Plan::new(
            PlanId::new(),
            "premium-monthly",
            "Premium",
            Money::new(9990, Currency::new("CLP").unwrap()).unwrap(),
            BillingCycle::Monthly,
            0,
        )
        .unwrap();
        let plans = Arc::new(InMemoryPlanRepository::new());
        plans.save(&plan).await.unwrap();
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let handler = StartCheckoutHandler::new(
            plans,
            subscriptions.clone(),
            Arc::new(MockPaymentProvider::failing()),
        );

        let cmd = command();
        let err = handler.handle(cmd.clone()).await.unwrap_err();
        assert!(matches!(err, BillingError::ProviderFailed { .. }));

        // The pending subscription exists but holds no preapproval, so a
        // retry goes through the create path again.
        let sub = subscriptions
            .find_by_subscriber_and_plan(&cmd.subscriber_id, &plan.id)
            .await
            .unwrap()
            .unwrap();
        assert!(sub.preapproval_id.is_none());
    }

    #[tokio::test]
    async fn checkout_after_cancellation_creates_a_fresh_subscription() {
        let (handler, subscriptions, _, _) = fixture().await;
        let cmd = command();

        let first = handler.handle(cmd.clone()).await.unwrap();
        let mut sub = subscriptions
            .find_by_id(&first.subscription_id)
            .await
            .unwrap()
            .unwrap();
        sub.cancel("changed my mind", Timestamp::now());
        subscriptions.update(&sub).await.unwrap();

        let second = handler.handle(cmd).await.unwrap();

        assert_ne!(first.subscription_id, second.subscription_id);
        assert!(!second.resumed);
    }
}
