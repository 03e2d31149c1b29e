//! Subscription aggregate entity.
//!
//! A Subscription joins one Subscriber to one Plan and owns the lifecycle
//! driven by three concurrent writers: direct creation, the browser
//! redirect, and provider webhooks. All transitions are expressed as
//! commutative, idempotent functions returning a [`TransitionOutcome`], so
//! a late or duplicate provider event degrades to a logged no-op instead
//! of an error.
//!
//! # Invariants
//!
//! - `id` is globally unique
//! - `preapproval_id`, once assigned, is immutable and globally unique;
//!   it is the join key between this record and the provider's async events
//! - Status transitions follow the state machine in `status.rs`
//! - Subscriptions are never deleted, only terminal-stated

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DomainError, ErrorCode, PlanId, StateMachine, SubscriberId, SubscriptionId, Timestamp,
};

use super::{BillingCycle, SubscriptionStatus};

/// Result of applying an event to the aggregate.
///
/// Distinguishes a real state change from the two benign non-changes so
/// callers can log duplicates and late arrivals without treating them as
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The event changed the subscription's state.
    Applied,
    /// The subscription was already in the target state.
    Noop,
    /// The subscription is terminal; the event was ignored.
    IgnoredTerminal,
}

/// Who is requesting a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelActor {
    /// The subscriber who owns the subscription.
    Subscriber(SubscriberId),
    /// A platform administrator.
    Administrator,
}

/// Subscription aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier.
    pub id: SubscriptionId,

    /// Subscriber who owns this subscription.
    pub subscriber_id: SubscriberId,

    /// Plan being subscribed to.
    pub plan_id: PlanId,

    /// Current lifecycle status.
    pub status: SubscriptionStatus,

    /// Provider preapproval id; unique and immutable once set.
    pub preapproval_id: Option<String>,

    /// When the mandate was confirmed.
    pub start_date: Option<Timestamp>,

    /// When the provider is expected to charge next.
    pub next_charge_at: Option<Timestamp>,

    /// Why the subscription was cancelled, if it was.
    pub cancel_reason: Option<String>,

    /// When the subscription was cancelled.
    pub cancelled_at: Option<Timestamp>,

    /// When the subscription was created.
    pub created_at: Timestamp,

    /// When the subscription was last updated.
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates a new subscription in `Pending` state.
    pub fn create(id: SubscriptionId, subscriber_id: SubscriberId, plan_id: PlanId) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            subscriber_id,
            plan_id,
            status: SubscriptionStatus::Pending,
            preapproval_id: None,
            start_date: None,
            next_charge_at: None,
            cancel_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Assigns the provider preapproval id.
    ///
    /// Idempotent for the same value; rejects reassignment to a different
    /// value since the preapproval id is the immutable join key.
    pub fn assign_preapproval(&mut self, preapproval_id: impl Into<String>) -> Result<(), DomainError> {
        let preapproval_id = preapproval_id.into();
        match &self.preapproval_id {
            Some(existing) if existing == &preapproval_id => Ok(()),
            Some(existing) => Err(DomainError::new(
                ErrorCode::PreapprovalAlreadyAssigned,
                format!(
                    "Subscription {} already bound to preapproval {}",
                    self.id, existing
                ),
            )),
            None => {
                self.preapproval_id = Some(preapproval_id);
                self.touch();
                Ok(())
            }
        }
    }

    /// Applies a redirect confirmation reported by the browser callback.
    ///
    /// Provider statuses `authorized` and `active` confirm the mandate:
    /// the subscription moves to `Authorized`, the start date is stamped,
    /// and the next charge date is one billing cycle out. Any other
    /// provider status leaves the subscription `Pending`; the webhook is
    /// the authoritative path and will catch up.
    pub fn confirm_authorization(
        &mut self,
        provider_status: &str,
        cycle: BillingCycle,
        now: Timestamp,
    ) -> TransitionOutcome {
        if self.status.is_terminal() {
            return TransitionOutcome::IgnoredTerminal;
        }
        if !matches!(provider_status, "authorized" | "active") {
            return TransitionOutcome::Noop;
        }
        // The webhook may already have activated the subscription; the
        // redirect must never regress it.
        if matches!(
            self.status,
            SubscriptionStatus::Authorized | SubscriptionStatus::Active
        ) {
            return TransitionOutcome::Noop;
        }
        self.status = SubscriptionStatus::Authorized;
        self.start_date = Some(now);
        self.next_charge_at = Some(cycle.next_charge_from(now));
        self.touch();
        TransitionOutcome::Applied
    }

    /// Applies an approved charge reported by the webhook path.
    ///
    /// `Pending` and `Authorized` subscriptions become `Active`; a paused
    /// mandate the provider nevertheless charged resumes. Re-applying on
    /// an already-`Active` subscription is a no-op.
    pub fn mark_payment_approved(&mut self, cycle: BillingCycle, now: Timestamp) -> TransitionOutcome {
        if self.status.is_terminal() {
            return TransitionOutcome::IgnoredTerminal;
        }
        if self.status == SubscriptionStatus::Active {
            return TransitionOutcome::Noop;
        }
        self.status = SubscriptionStatus::Active;
        if self.start_date.is_none() {
            // Webhook arrived before the redirect: stamp the cycle here.
            self.start_date = Some(now);
        }
        self.next_charge_at = Some(cycle.next_charge_from(now));
        self.touch();
        TransitionOutcome::Applied
    }

    /// Pauses recurring charges.
    pub fn pause(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Paused)?;
        self.touch();
        Ok(())
    }

    /// Resumes a paused subscription.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.touch();
        Ok(())
    }

    /// Cancels the subscription, stamping the reason and time.
    ///
    /// Cancelling an already-terminal subscription is ignored, not an
    /// error: late provider events and double-clicks are expected.
    pub fn cancel(&mut self, reason: impl Into<String>, now: Timestamp) -> TransitionOutcome {
        if self.status.is_terminal() {
            return TransitionOutcome::IgnoredTerminal;
        }
        self.status = SubscriptionStatus::Cancelled;
        self.cancel_reason = Some(reason.into());
        self.cancelled_at = Some(now);
        self.touch();
        TransitionOutcome::Applied
    }

    /// Marks the subscription expired (mandate lapsed provider-side).
    pub fn expire(&mut self) -> TransitionOutcome {
        if self.status.is_terminal() {
            return TransitionOutcome::IgnoredTerminal;
        }
        self.status = SubscriptionStatus::Expired;
        self.touch();
        TransitionOutcome::Applied
    }

    /// Checks whether the actor may cancel this subscription.
    pub fn may_be_cancelled_by(&self, actor: &CancelActor) -> bool {
        match actor {
            CancelActor::Administrator => true,
            CancelActor::Subscriber(id) => id == &self.subscriber_id,
        }
    }

    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {:?} to {:?}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
