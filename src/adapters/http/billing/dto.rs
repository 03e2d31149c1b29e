//! Request/response DTOs for the billing HTTP surface.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::StartCheckoutResult;
use crate::domain::billing::Subscription;

/// POST /api/billing/checkout request.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_code: String,
    pub email: String,
}

/// POST /api/billing/checkout response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub subscription_id: String,
    pub checkout_url: String,
    /// True when an existing checkout was resumed instead of created.
    pub resumed: bool,
}

impl From<StartCheckoutResult> for CheckoutResponse {
    fn from(result: StartCheckoutResult) -> Self {
        Self {
            subscription_id: result.subscription_id.to_string(),
            checkout_url: result.checkout_url,
            resumed: result.resumed,
        }
    }
}

/// POST /api/billing/cancel request.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub subscription_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// GET /api/billing/subscriptions/{id} response.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub plan_id: String,
    pub status: String,
    pub has_access: bool,
    pub preapproval_id: Option<String>,
    pub start_date: Option<String>,
    pub next_charge_at: Option<String>,
    pub cancelled_at: Option<String>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id.to_string(),
            plan_id: sub.plan_id.to_string(),
            status: format!("{:?}", sub.status).to_lowercase(),
            has_access: sub.status.has_access(),
            preapproval_id: sub.preapproval_id,
            start_date: sub.start_date.map(|t| t.to_string()),
            next_charge_at: sub.next_charge_at.map(|t| t.to_string()),
            cancelled_at: sub.cancelled_at.map(|t| t.to_string()),
        }
    }
}

/// Query parameters the provider appends to redirect callbacks.
#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub preapproval_id: Option<String>,
    /// Provider status; different checkout flows use different names.
    pub status: Option<String>,
    pub collection_status: Option<String>,
    pub external_reference: Option<String>,
}

/// Query parameters on webhook deliveries.
#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    /// Legacy envelopes carry the data id here instead of in the body.
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    /// Shared secret token, enforced when configured.
    pub token: Option<String>,
}

/// Standard error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
