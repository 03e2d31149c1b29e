//! CancelSubscriptionHandler - subscriber/admin initiated cancellation.

use std::sync::Arc;

use crate::domain::billing::{BillingError, CancelActor, TransitionOutcome};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{PaymentProvider, SubscriptionRepository};

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    /// Who is asking; only the owner or an administrator may cancel.
    pub actor: CancelActor,
    pub reason: String,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelSubscriptionResult {
    /// The subscription was cancelled.
    Cancelled,
    /// The subscription was already in a terminal state; nothing changed.
    AlreadyTerminal,
}

/// Handler for the cancel endpoint.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    provider: Arc<dyn PaymentProvider>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            subscriptions,
            provider,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let mut subscription = self
            .subscriptions
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(cmd.subscription_id))?;

        if !subscription.may_be_cancelled_by(&cmd.actor) {
            return Err(BillingError::Forbidden);
        }

        // Cancel the mandate provider-side first: if that call fails the
        // local record stays untouched and the caller can retry, rather
        // than leaving a live mandate behind a cancelled-looking row.
        if let Some(preapproval_id) = subscription.preapproval_id.clone() {
            use crate::domain::foundation::StateMachine;
            if !subscription.status.is_terminal() {
                self.provider
                    .cancel_preapproval(&preapproval_id)
                    .await
                    .map_err(|e| BillingError::provider_failed(e.to_string(), e.retryable))?;
            }
        }

        match subscription.cancel(&cmd.reason, Timestamp::now()) {
            TransitionOutcome::Applied => {
                self.subscriptions.update(&subscription).await?;
                tracing::info!(
                    subscription_id = %subscription.id,
                    reason = %cmd.reason,
                    "subscription cancelled"
                );
                Ok(CancelSubscriptionResult::Cancelled)
            }
            TransitionOutcome::IgnoredTerminal => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    "cancel on terminal subscription, no-op"
                );
                Ok(CancelSubscriptionResult::AlreadyTerminal)
            }
            TransitionOutcome::Noop => Ok(CancelSubscriptionResult::AlreadyTerminal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::mercadopago::MockPaymentProvider;
    use crate::domain::billing::{Subscription, SubscriptionStatus};
    use crate::domain::foundation::{PlanId, SubscriberId};

    async fn fixture() -> (
        CancelSubscriptionHandler,
        Arc<InMemorySubscriptionRepository>,
        Arc<MockPaymentProvider>,
        Subscription,
    ) {
        let mut subscription =
            Subscription::create(SubscriptionId::new(), SubscriberId::new(), PlanId::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let preapproval = provider.seed_preapproval("authorized");
        subscription.assign_preapproval(&preapproval).unwrap();

        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        subscriptions.save(&subscription).await.unwrap();

        let handler = CancelSubscriptionHandler::new(subscriptions.clone(), provider.clone());
        (handler, subscriptions, provider, subscription)
    }

    #[tokio::test]
    async fn owner_can_cancel() {
        let (handler, subscriptions, provider, subscription) = fixture().await;
        let cmd = CancelSubscriptionCommand {
            subscription_id: subscription.id,
            actor: CancelActor::Subscriber(subscription.subscriber_id),
            reason: "too expensive".to_string(),
        };

        let result = handler.handle(cmd).await.unwrap();

        assert_eq!(result, CancelSubscriptionResult::Cancelled);
        let sub = subscriptions
            .find_by_id(&subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert_eq!(sub.cancel_reason.as_deref(), Some("too expensive"));
        assert!(provider.preapproval_cancelled(subscription.preapproval_id.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn admin_can_cancel() {
        let (handler, _, _, subscription) = fixture().await;
        let cmd = CancelSubscriptionCommand {
            subscription_id: subscription.id,
            actor: CancelActor::Administrator,
            reason: "fraud review".to_string(),
        };

        let result = handler.handle(cmd).await.unwrap();
        assert_eq!(result, CancelSubscriptionResult::Cancelled);
    }

    #[tokio::test]
    async fn stranger_is_forbidden() {
        let (handler, subscriptions, _, subscription) = fixture().await;
        let cmd = CancelSubscriptionCommand {
            subscription_id: subscription.id,
            actor: CancelActor::Subscriber(SubscriberId::new()),
            reason: "hostile".to_string(),
        };

        let err = handler.handle(cmd).await.unwrap_err();

        assert_eq!(err, BillingError::Forbidden);
        let sub = subscriptions
            .find_by_id(&subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn cancelling_twice_is_a_noop() {
        let (handler, _, _, subscription) = fixture().await;
        let cmd = CancelSubscriptionCommand {
            subscription_id: subscription.id,
            actor: CancelActor::Administrator,
            reason: "first".to_string(),
        };

        handler.handle(cmd.clone()).await.unwrap();
        let second = handler.handle(cmd).await.unwrap();

        assert_eq!(second, CancelSubscriptionResult::AlreadyTerminal);
    }

    #[tokio::test]
    async fn provider_failure_leaves_local_state_untouched() {
        let mut subscription =
            Subscription::create(SubscriptionId::new(), SubscriberId::new(), PlanId::new());
        subscription.assign_preapproval("pre_1").unwrap();
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        subscriptions.save(&subscription).await.unwrap();
        let handler = CancelSubscriptionHandler::new(
            subscriptions.clone(),
            Arc::new(MockPaymentProvider::failing()),
        );

        let err = handler
            .handle(CancelSubscriptionCommand {
                subscription_id: subscription.id,
                actor: CancelActor::Administrator,
                reason: "x".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::ProviderFailed { .. }));
        let sub = subscriptions
            .find_by_id(&subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        let (handler, _, _, _) = fixture().await;
        let err = handler
            .handle(CancelSubscriptionCommand {
                subscription_id: SubscriptionId::new(),
                actor: CancelActor::Administrator,
                reason: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionNotFound(_)));
    }
}
