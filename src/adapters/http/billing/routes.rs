//! Axum router configuration for the billing module.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, get_subscription, handle_webhook, payment_redirect, start_checkout,
    BillingAppState,
};

/// Authenticated billing API routes.
///
/// - `POST /checkout` - start or resume a subscription checkout
/// - `POST /cancel` - cancel a subscription
/// - `GET /subscriptions/{id}` - subscription details
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(start_checkout))
        .route("/cancel", post(cancel_subscription))
        .route("/subscriptions/:id", get(get_subscription))
}

/// Browser-facing redirect callbacks (no auth; tolerate zero deliveries).
///
/// - `GET /payment/{success|pending|failure}`
pub fn callback_routes() -> Router<BillingAppState> {
    Router::new().route("/payment/:outcome", get(payment_redirect))
}

/// Provider-facing webhook routes (no auth; token + signature verified).
///
/// - `POST /mercadopago`
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/mercadopago", post(handle_webhook))
}

/// The complete billing module router.
///
/// Mounts as:
/// - `/api/billing/...`
/// - `/callbacks/...`
/// - `/api/webhooks/...`
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api/billing", billing_routes())
        .nest("/callbacks", callback_routes())
        .nest("/api/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::memory::{
        InMemoryInvoiceRepository, InMemoryPaymentRepository, InMemoryPlanRepository,
        InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
    };
    use crate::adapters::mercadopago::MockPaymentProvider;
    use crate::adapters::http::billing::RedirectPages;
    use crate::domain::billing::WebhookSignatureVerifier;

    fn test_state() -> BillingAppState {
        BillingAppState {
            plans: Arc::new(InMemoryPlanRepository::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            payments: Arc::new(InMemoryPaymentRepository::new()),
            invoices: Arc::new(InMemoryInvoiceRepository::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
            provider: Arc::new(MockPaymentProvider::new()),
            verifier: Arc::new(WebhookSignatureVerifier::new(None, false)),
            webhook_token: None,
            redirect_pages: RedirectPages {
                success: "https://app.example.com/pago/exitoso".to_string(),
                pending: "https://app.example.com/pago/pendiente".to_string(),
                failure: "https://app.example.com/pago/fallido".to_string(),
            },
        }
    }

    #[test]
    fn billing_routes_creates_router() {
        let _: Router<()> = billing_routes().with_state(test_state());
    }

    #[test]
    fn callback_routes_creates_router() {
        let _: Router<()> = callback_routes().with_state(test_state());
    }

    #[test]
    fn webhook_routes_creates_router() {
        let _: Router<()> = webhook_routes().with_state(test_state());
    }

    #[test]
    fn billing_router_creates_combined_router() {
        let _: Router<()> = billing_router().with_state(test_state());
    }
}
