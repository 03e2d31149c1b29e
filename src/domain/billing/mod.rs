//! Billing domain module.
//!
//! The reconciliation core: subscription lifecycle, payment recording,
//! invoice emission, and the codecs/verifiers that correlate provider
//! events back to internal records.
//!
//! # Module Structure
//!
//! - `plan` - billing plan catalog entry and the amount/currency gate
//! - `subscription` - Subscription aggregate
//! - `status` - SubscriptionStatus state machine
//! - `payment` - Payment entity and provider payment statuses
//! - `invoice` - Invoice entity
//! - `external_reference` - correlation token codec (canonical + legacy shim)
//! - `idempotency` - deterministic idempotency keys for provider calls
//! - `signature` - inbound webhook signature verification
//! - `provider_event` - inbound webhook envelope parsing

mod errors;
mod external_reference;
mod idempotency;
mod invoice;
mod payment;
mod plan;
mod provider_event;
mod signature;
mod status;
mod subscription;
mod webhook_errors;

pub use errors::BillingError;
pub use external_reference::{DecodedReference, ExternalReference, ReferenceError};
pub use idempotency::IdempotencyKey;
pub use invoice::Invoice;
pub use payment::{Payment, PaymentStatus};
pub use plan::{BillingCycle, ConsistencyError, Plan};
pub use provider_event::{EventTopic, ProviderEvent};
pub use signature::{SignatureError, SignatureHeader, WebhookSignatureVerifier};
pub use status::SubscriptionStatus;
pub use subscription::{CancelActor, Subscription, TransitionOutcome};
pub use webhook_errors::WebhookError;
