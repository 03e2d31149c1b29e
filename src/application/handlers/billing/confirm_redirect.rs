//! ConfirmRedirectHandler - apply a browser redirect callback.
//!
//! The redirect is a UX accelerator: it may arrive before, after, or
//! never relative to the authoritative webhook. Applying it is therefore
//! a pure idempotent transition that can only move a subscription
//! forward (pending -> authorized), never backward.

use std::sync::Arc;

use crate::domain::billing::{
    BillingCycle, BillingError, ExternalReference, Subscription, TransitionOutcome,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{PlanRepository, SubscriptionRepository};

/// A redirect callback's decoded query parameters.
#[derive(Debug, Clone)]
pub struct ConfirmRedirectCommand {
    /// Preapproval id echoed in the query string, if present.
    pub preapproval_id: Option<String>,
    /// Provider status echoed in the query string.
    pub provider_status: String,
    /// External reference echoed in the query string, if present.
    pub external_reference: Option<String>,
}

/// Result of applying a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmRedirectResult {
    /// The mandate was confirmed; subscription is now authorized.
    Confirmed { subscription_id: SubscriptionId },
    /// Provider did not report authorization; still pending.
    StillPending { subscription_id: SubscriptionId },
    /// The subscription was already authorized/active or is terminal.
    Unchanged { subscription_id: SubscriptionId },
}

/// Handler for redirect callbacks.
pub struct ConfirmRedirectHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
}

impl ConfirmRedirectHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
        }
    }

    pub async fn handle(
        &self,
        cmd: ConfirmRedirectCommand,
    ) -> Result<ConfirmRedirectResult, BillingError> {
        let mut subscription = self.resolve_subscription(&cmd).await?;

        // The redirect may be the first place we see the preapproval id
        // bound to this subscription (e.g. the claim call was lost).
        if let (Some(preapproval_id), None) =
            (cmd.preapproval_id.as_deref(), &subscription.preapproval_id)
        {
            tracing::warn!(
                subscription_id = %subscription.id,
                preapproval_id,
                "binding preapproval id from redirect callback"
            );
            subscription.assign_preapproval(preapproval_id)?;
        }

        let cycle = match self.plans.find_by_id(&subscription.plan_id).await? {
            Some(plan) => plan.billing_cycle,
            None => BillingCycle::Monthly,
        };

        let outcome =
            subscription.confirm_authorization(&cmd.provider_status, cycle, Timestamp::now());
        match outcome {
            TransitionOutcome::Applied => {
                self.subscriptions.update(&subscription).await?;
                tracing::info!(
                    subscription_id = %subscription.id,
                    provider_status = %cmd.provider_status,
                    "subscription authorized via redirect"
                );
                Ok(ConfirmRedirectResult::Confirmed {
                    subscription_id: subscription.id,
                })
            }
            TransitionOutcome::Noop => {
                // Either the provider reported a non-confirming status or
                // the webhook beat us here; persist a late preapproval
                // binding if one was made.
                self.subscriptions.update(&subscription).await?;
                if matches!(cmd.provider_status.as_str(), "authorized" | "active") {
                    Ok(ConfirmRedirectResult::Unchanged {
                        subscription_id: subscription.id,
                    })
                } else {
                    Ok(ConfirmRedirectResult::StillPending {
                        subscription_id: subscription.id,
                    })
                }
            }
            TransitionOutcome::IgnoredTerminal => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    status = ?subscription.status,
                    "redirect against terminal subscription ignored"
                );
                Ok(ConfirmRedirectResult::Unchanged {
                    subscription_id: subscription.id,
                })
            }
        }
    }

    async fn resolve_subscription(
        &self,
        cmd: &ConfirmRedirectCommand,
    ) -> Result<Subscription, BillingError> {
        if let Some(raw) = cmd.external_reference.as_deref() {
            if let Ok(decoded) = ExternalReference::decode(raw) {
                if let Some(subscription) = self
                    .subscriptions
                    .find_by_id(&decoded.subscription_id())
                    .await?
                {
                    return Ok(subscription);
                }
            }
        }

        if let Some(preapproval_id) = cmd.preapproval_id.as_deref() {
            if let Some(subscription) = self
                .subscriptions
                .find_by_preapproval_id(preapproval_id)
                .await?
            {
                tracing::warn!(
                    preapproval_id,
                    subscription_id = %subscription.id,
                    "redirect correlated via preapproval id fallback"
                );
                return Ok(subscription);
            }
        }

        Err(BillingError::correlation_failed(
            "redirect carried no resolvable reference or preapproval id",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPlanRepository, InMemorySubscriptionRepository};
    use crate::domain::billing::{Plan, SubscriptionStatus};
    use crate::domain::foundation::{Currency, Money, PlanId, SubscriberId};

    struct Fixture {
        handler: ConfirmRedirectHandler,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        subscription: Subscription,
        reference: String,
    }

    async fn fixture() -> Fixture {
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

        let mut subscription =
            Subscription::create(SubscriptionId::new(), SubscriberId::new(), plan.id);
        subscription.assign_preapproval("pre_1").unwrap();
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        subscriptions.save(&subscription).await.unwrap();

        let reference = ExternalReference {
            subscriber_id: subscription.subscriber_id,
            subscription_id: subscription.id,
            expected_amount_minor: 9990,
            expected_currency: plan.price.currency,
            plan_code: plan.code.clone(),
        }
        .encode();

        Fixture {
            handler: ConfirmRedirectHandler::new(subscriptions.clone(), plans),
            subscriptions,
            subscription,
            reference,
        }
    }

    #[tokio::test]
    async fn authorized_redirect_confirms_the_mandate() {
        let fx = fixture().await;
        let cmd = ConfirmRedirectCommand {
            preapproval_id: Some("pre_1".to_string()),
            provider_status: "authorized".to_string(),
            external_reference: Some(fx.reference.clone()),
        };

        let result = fx.handler.handle(cmd).await.unwrap();

        assert_eq!(
            result,
            ConfirmRedirectResult::Confirmed {
                subscription_id: fx.subscription.id
            }
        );
        let sub = fx
            .subscriptions
            .find_by_id(&fx.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Authorized);
        assert!(sub.start_date.is_some());
        assert!(sub.next_charge_at.is_some());
    }

    #[tokio::test]
    async fn pending_redirect_leaves_subscription_pending() {
        let fx = fixture().await;
        let cmd = ConfirmRedirectCommand {
            preapproval_id: Some("pre_1".to_string()),
            provider_status: "pending".to_string(),
            external_reference: Some(fx.reference.clone()),
        };

        let result = fx.handler.handle(cmd).await.unwrap();

        assert_eq!(
            result,
            ConfirmRedirectResult::StillPending {
                subscription_id: fx.subscription.id
            }
        );
    }

    #[tokio::test]
    async fn redirect_without_reference_uses_preapproval_fallback() {
        let fx = fixture().await;
        let cmd = ConfirmRedirectCommand {
            preapproval_id: Some("pre_1".to_string()),
            provider_status: "authorized".to_string(),
            external_reference: None,
        };

        let result = fx.handler.handle(cmd).await.unwrap();
        assert!(matches!(result, ConfirmRedirectResult::Confirmed { .. }));
    }

    #[tokio::test]
    async fn duplicate_redirect_is_unchanged() {
        let fx = fixture().await;
        let cmd = ConfirmRedirectCommand {
            preapproval_id: Some("pre_1".to_string()),
            provider_status: "authorized".to_string(),
            external_reference: Some(fx.reference.clone()),
        };

        fx.handler.handle(cmd.clone()).await.unwrap();
        let second = fx.handler.handle(cmd).await.unwrap();

        assert_eq!(
            second,
            ConfirmRedirectResult::Unchanged {
                subscription_id: fx.subscription.id
            }
        );
    }

    #[tokio::test]
    async fn unresolvable_redirect_is_a_correlation_failure() {
        let fx = fixture().await;
        let cmd = ConfirmRedirectCommand {
            preapproval_id: Some("pre_unknown".to_string()),
            provider_status: "authorized".to_string(),
            external_reference: None,
        };

        let err = fx.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, BillingError::CorrelationFailed(_)));
    }
}
