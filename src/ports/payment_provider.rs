//! Payment provider port for external payment processing.
//!
//! Defines the contract for the payment gateway integration. A
//! **preapproval** is the provider's recurring-charge mandate; a
//! **preference** is its one-off checkout intent. Both return an
//! `init_point` URL the subscriber's browser is sent to.
//!
//! # Design
//!
//! - **Idempotent**: every write request carries a deterministic
//!   idempotency key so network-level retries dedupe provider-side
//! - **Bounded**: implementations use a request timeout and a small fixed
//!   retry budget - duplicate financial operations are worse than a failed
//!   call surfaced to the caller

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Port for the payment provider integration.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a recurring-charge preapproval and its checkout URL.
    async fn create_preapproval(
        &self,
        request: CreatePreapprovalRequest,
    ) -> Result<Preapproval, ProviderError>;

    /// Fetch a preapproval by provider id.
    async fn get_preapproval(&self, preapproval_id: &str)
        -> Result<Option<Preapproval>, ProviderError>;

    /// Cancel a preapproval provider-side.
    async fn cancel_preapproval(&self, preapproval_id: &str) -> Result<Preapproval, ProviderError>;

    /// Create a one-off checkout preference.
    async fn create_preference(
        &self,
        request: CreatePreferenceRequest,
    ) -> Result<Preference, ProviderError>;

    /// Fetch a payment by provider id.
    ///
    /// Webhook bodies carry only the payment id; the amount, currency,
    /// status and external reference come from this call.
    async fn get_payment(&self, payment_id: &str) -> Result<Option<ProviderPayment>, ProviderError>;
}

/// Request to create a preapproval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePreapprovalRequest {
    /// Human-readable mandate title shown at checkout.
    pub reason: String,

    /// Subscriber email for checkout pre-fill.
    pub payer_email: String,

    /// Charge amount per cycle, minor units.
    pub amount_minor: i64,

    /// Charge currency.
    pub currency: String,

    /// Months between charges (1 or 12).
    pub frequency_months: u32,

    /// Correlation token echoed back in callbacks and webhooks.
    pub external_reference: String,

    /// URL the provider redirects to after checkout.
    pub back_url: String,

    /// Deterministic dedup key for this request.
    pub idempotency_key: String,
}

/// Provider-side preapproval status as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreapprovalStatus {
    Pending,
    Authorized,
    Paused,
    Cancelled,
    Unknown(String),
}

impl PreapprovalStatus {
    /// Parses the provider's status string.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "pending" => PreapprovalStatus::Pending,
            "authorized" | "active" => PreapprovalStatus::Authorized,
            "paused" => PreapprovalStatus::Paused,
            "cancelled" => PreapprovalStatus::Cancelled,
            other => PreapprovalStatus::Unknown(other.to_string()),
        }
    }
}

/// A recurring-charge mandate at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preapproval {
    /// Provider's preapproval id.
    pub id: String,

    /// Checkout URL for the subscriber's browser.
    pub init_point: String,

    /// Current provider-side status.
    pub status: PreapprovalStatus,

    /// Correlation token we attached at creation.
    pub external_reference: Option<String>,
}

/// Request to create a one-off checkout preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePreferenceRequest {
    /// Line-item title.
    pub title: String,

    /// Amount in minor units.
    pub amount_minor: i64,

    /// Currency code.
    pub currency: String,

    /// Correlation token echoed back in callbacks and webhooks.
    pub external_reference: String,

    /// Success/pending/failure redirect URLs.
    pub back_urls: BackUrls,

    /// Deterministic dedup key for this request.
    pub idempotency_key: String,
}

/// The three browser-return URLs attached to a preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackUrls {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

/// A one-off checkout intent at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    /// Provider's preference id.
    pub id: String,

    /// Checkout URL for the subscriber's browser.
    pub init_point: String,
}

/// A payment as reported by the provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayment {
    /// Provider's payment id.
    pub id: String,

    /// Provider status string ("approved", "rejected", ...).
    pub status: String,

    /// Provider's failure detail, if any.
    pub status_detail: Option<String>,

    /// Amount in minor units.
    pub amount_minor: i64,

    /// Currency code.
    pub currency: String,

    /// Correlation token echoed back, if the event shape carries it.
    pub external_reference: Option<String>,

    /// Preapproval this charge was made under, if recurring.
    pub preapproval_id: Option<String>,

    /// Raw provider response, kept for the audit trail.
    pub raw: serde_json::Value,
}

/// Errors from provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Error category.
    pub code: ProviderErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl ProviderError {
    /// Create a new provider error.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    /// Network-level failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    /// Provider returned a non-success response.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Api, message)
    }

    /// Provider response could not be decoded.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Decode, message)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Provider error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Network connectivity or timeout.
    Network,
    /// Provider rejected the request.
    Api,
    /// Provider response did not parse.
    Decode,
    /// Rate limit exceeded.
    RateLimited,
}

impl ProviderErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::Network | ProviderErrorCode::RateLimited
        )
    }
}
