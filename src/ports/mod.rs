//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Repository Ports
//!
//! - `PlanRepository` - billing plan catalog reads
//! - `SubscriptionRepository` - subscription persistence + preapproval claim
//! - `PaymentRepository` - payment persistence with provider-id dedup
//! - `InvoiceRepository` - invoice persistence with payment-id uniqueness
//! - `WebhookEventRepository` - write-ahead ingestion log
//!
//! ## Provider Port
//!
//! - `PaymentProvider` - outbound calls to the payment gateway
//!
//! Each insert that races on a unique constraint reports its outcome
//! (`Inserted` vs duplicate/claimed) instead of erroring: the storage
//! constraint IS the concurrency control, and losing the race is the
//! expected dedup path.

mod invoice_repository;
mod payment_provider;
mod payment_repository;
mod plan_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use invoice_repository::{InvoiceInsert, InvoiceRepository};
pub use payment_provider::{
    CreatePreapprovalRequest, CreatePreferenceRequest, PaymentProvider, Preapproval,
    PreapprovalStatus, Preference, ProviderError, ProviderErrorCode, ProviderPayment,
};
pub use payment_repository::{PaymentInsert, PaymentRepository};
pub use plan_repository::PlanRepository;
pub use subscription_repository::{ClaimOutcome, SubscriptionRepository};
pub use webhook_event_repository::{
    ProcessingOutcome, SaveResult, WebhookEventRecord, WebhookEventRepository,
};
