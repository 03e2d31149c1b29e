//! SubscriptionRepository port.
//!
//! The unique constraint on the provider preapproval id is the concurrency
//! control for checkout: two concurrent "start checkout" calls race to
//! claim it, and the loser must re-read and return the winner's record
//! instead of creating a second provider resource.

use async_trait::async_trait;

use crate::domain::billing::Subscription;
use crate::domain::foundation::{DomainError, PlanId, SubscriberId, SubscriptionId};

/// Result of attempting to bind a preapproval id to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller bound the preapproval id.
    Claimed,
    /// Another caller already bound one; the current row is returned.
    AlreadyClaimed(Subscription),
}

/// Port for subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription.
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update an existing subscription.
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Find by id.
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Find a subscriber's subscription on a given plan.
    async fn find_by_subscriber_and_plan(
        &self,
        subscriber_id: &SubscriberId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Find the subscription bound to a provider preapproval id.
    ///
    /// The fallback correlation path for events with no usable external
    /// reference.
    async fn find_by_preapproval_id(
        &self,
        preapproval_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Atomically bind a preapproval id to a subscription that has none.
    ///
    /// Backed by the unique constraint: if the subscription already holds
    /// a (different) preapproval id - because a concurrent caller won the
    /// race - the current row is returned as `AlreadyClaimed` and the
    /// caller must discard its own provider resource reference.
    async fn claim_preapproval(
        &self,
        id: &SubscriptionId,
        preapproval_id: &str,
    ) -> Result<ClaimOutcome, DomainError>;
}
