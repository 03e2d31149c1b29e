//! Foundation types shared across the domain.
//!
//! - `ids` - strongly-typed identifier value objects
//! - `timestamp` - immutable UTC point-in-time value object
//! - `money` - minor-unit amounts and currency codes
//! - `errors` - validation and domain error types
//! - `state_machine` - trait for status enums with validated transitions

mod errors;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{InvoiceId, PaymentId, PlanId, SubscriberId, SubscriptionId};
pub use money::{Currency, Money};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
