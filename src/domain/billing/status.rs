//! Subscription status state machine.
//!
//! Defines all possible subscription states and valid transitions in the
//! recurring-payment lifecycle. Three independent event sources (direct
//! creation, the browser redirect, and provider webhooks) drive these
//! transitions, so the table below is the single authority on what each
//! source may do.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Initial state: checkout started, mandate not yet confirmed.
    Pending,

    /// Mandate confirmed via the redirect callback; first charge not yet seen.
    Authorized,

    /// At least one successful charge cycle. Full access.
    Active,

    /// Recurring charges suspended; mandate still exists at the provider.
    Paused,

    /// Cancelled by the subscriber or an administrator. Terminal.
    Cancelled,

    /// Ended without cancellation (mandate lapsed). Terminal.
    Expired,
}

impl SubscriptionStatus {
    /// Returns true if this status grants access to the product.
    pub fn has_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    /// Returns true for states the provider may still bill against.
    pub fn is_billable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Pending
                | SubscriptionStatus::Authorized
                | SubscriptionStatus::Active
                | SubscriptionStatus::Paused
        )
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From PENDING
            (Pending, Authorized)
                | (Pending, Active)
                | (Pending, Cancelled)
                | (Pending, Expired)
            // From AUTHORIZED
                | (Authorized, Active)
                | (Authorized, Cancelled)
                | (Authorized, Expired)
            // From ACTIVE
                | (Active, Paused)
                | (Active, Cancelled)
                | (Active, Expired)
            // From PAUSED
                | (Paused, Active)
                | (Paused, Cancelled)
                | (Paused, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Pending => vec![Authorized, Active, Cancelled, Expired],
            Authorized => vec![Active, Cancelled, Expired],
            Active => vec![Paused, Cancelled, Expired],
            Paused => vec![Active, Cancelled, Expired],
            Cancelled => vec![],
            Expired => vec![],
        }
    }
}
