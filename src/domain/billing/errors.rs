//! Billing-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | PlanNotFound | 404 |
//! | SubscriptionNotFound | 404 |
//! | PlanInactive | 409 |
//! | InvalidState | 409 |
//! | CorrelationFailed | 404 |
//! | Forbidden | 403 |
//! | ProviderFailed | 502 |
//! | ValidationFailed | 400 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, SubscriberId, SubscriptionId};

/// Errors raised by billing commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// No plan with the requested code.
    PlanNotFound(String),

    /// Plan exists but is closed to new subscriptions.
    PlanInactive(String),

    /// Subscription was not found.
    SubscriptionNotFound(SubscriptionId),

    /// No subscription exists for this subscriber.
    SubscriptionNotFoundForSubscriber(SubscriberId),

    /// The requested operation is invalid in the current state.
    InvalidState { current: String, attempted: String },

    /// A callback could not be correlated to a subscription.
    CorrelationFailed(String),

    /// The actor is not allowed to perform this operation.
    Forbidden,

    /// The payment provider call failed after its retry budget.
    ProviderFailed { reason: String, retryable: bool },

    /// Input validation failed.
    ValidationFailed { field: String, message: String },

    /// Storage or other infrastructure failure.
    Infrastructure(String),
}

impl BillingError {
    pub fn plan_not_found(code: impl Into<String>) -> Self {
        BillingError::PlanNotFound(code.into())
    }

    pub fn plan_inactive(code: impl Into<String>) -> Self {
        BillingError::PlanInactive(code.into())
    }

    pub fn subscription_not_found(id: SubscriptionId) -> Self {
        BillingError::SubscriptionNotFound(id)
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn correlation_failed(detail: impl Into<String>) -> Self {
        BillingError::CorrelationFailed(detail.into())
    }

    pub fn provider_failed(reason: impl Into<String>, retryable: bool) -> Self {
        BillingError::ProviderFailed {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns a user-facing error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::PlanNotFound(code) => format!("Plan not found: {}", code),
            BillingError::PlanInactive(code) => {
                format!("Plan '{}' is not open to new subscriptions", code)
            }
            BillingError::SubscriptionNotFound(id) => format!("Subscription not found: {}", id),
            BillingError::SubscriptionNotFoundForSubscriber(id) => {
                format!("No subscription found for subscriber: {}", id)
            }
            BillingError::InvalidState { current, attempted } => {
                format!("Cannot {} subscription in {} state", attempted, current)
            }
            BillingError::CorrelationFailed(detail) => {
                format!("Could not match the callback to a subscription: {}", detail)
            }
            BillingError::Forbidden => "Not allowed to manage this subscription".to_string(),
            BillingError::ProviderFailed { reason, .. } => {
                format!("Payment provider error: {}", reason)
            }
            BillingError::ValidationFailed { field, message } => {
                format!("Invalid {}: {}", field, message)
            }
            BillingError::Infrastructure(msg) => format!("Internal error: {}", msg),
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        BillingError::Infrastructure(err.to_string())
    }
}
