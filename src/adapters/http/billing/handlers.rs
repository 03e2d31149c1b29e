//! HTTP handlers for the billing endpoints.
//!
//! These connect axum routes to the application-layer command handlers
//! and own the error -> status mapping at the boundary.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};

use crate::application::handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, ConfirmRedirectCommand,
    ConfirmRedirectHandler, ConfirmRedirectResult, ProcessWebhookCommand, ProcessWebhookHandler,
    RecordPaymentHandler, StartCheckoutCommand, StartCheckoutHandler,
};
use crate::domain::billing::{
    BillingError, CancelActor, WebhookError, WebhookSignatureVerifier,
};
use crate::domain::foundation::{SubscriberId, SubscriptionId};
use crate::ports::{
    InvoiceRepository, PaymentProvider, PaymentRepository, PlanRepository,
    SubscriptionRepository, WebhookEventRepository,
};

use super::dto::{
    CancelRequest, CheckoutRequest, CheckoutResponse, ErrorResponse, RedirectQuery,
    SubscriptionResponse, WebhookQuery,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Front-end pages the redirect callbacks send the browser to.
#[derive(Debug, Clone)]
pub struct RedirectPages {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub plans: Arc<dyn PlanRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub provider: Arc<dyn PaymentProvider>,
    pub verifier: Arc<WebhookSignatureVerifier>,
    /// Shared secret token enforced on webhook query strings, if set.
    pub webhook_token: Option<String>,
    pub redirect_pages: RedirectPages,
}

impl BillingAppState {
    pub fn start_checkout_handler(&self) -> StartCheckoutHandler {
        StartCheckoutHandler::new(
            self.plans.clone(),
            self.subscriptions.clone(),
            self.provider.clone(),
        )
    }

    pub fn confirm_redirect_handler(&self) -> ConfirmRedirectHandler {
        ConfirmRedirectHandler::new(self.subscriptions.clone(), self.plans.clone())
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.subscriptions.clone(), self.provider.clone())
    }

    pub fn webhook_handler(&self) -> ProcessWebhookHandler {
        let recorder = Arc::new(RecordPaymentHandler::new(
            self.subscriptions.clone(),
            self.payments.clone(),
            self.plans.clone(),
            self.invoices.clone(),
        ));
        ProcessWebhookHandler::new(
            self.webhook_events.clone(),
            self.subscriptions.clone(),
            self.plans.clone(),
            self.provider.clone(),
            self.verifier.clone(),
            recorder,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscriber Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated subscriber extracted from the request.
///
/// Authentication lives at the gateway; it forwards the verified identity
/// in the X-Subscriber-Id header.
#[derive(Debug, Clone)]
pub struct AuthenticatedSubscriber {
    pub subscriber_id: SubscriberId,
    /// True when the identity carries the administrator role.
    pub is_admin: bool,
}

impl AuthenticatedSubscriber {
    fn cancel_actor(&self) -> CancelActor {
        if self.is_admin {
            CancelActor::Administrator
        } else {
            CancelActor::Subscriber(self.subscriber_id)
        }
    }
}

/// Rejection type for AuthenticatedSubscriber extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedSubscriber
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let subscriber_id = parts
                .headers
                .get("X-Subscriber-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<SubscriberId>().ok())
                .ok_or(AuthenticationRequired)?;

            let is_admin = parts
                .headers
                .get("X-Subscriber-Role")
                .and_then(|v| v.to_str().ok())
                .map(|r| r == "admin")
                .unwrap_or(false);

            Ok(AuthenticatedSubscriber {
                subscriber_id,
                is_admin,
            })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Authenticated Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/checkout - start or resume a subscription checkout
pub async fn start_checkout(
    State(state): State<BillingAppState>,
    subscriber: AuthenticatedSubscriber,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.start_checkout_handler();
    let cmd = StartCheckoutCommand {
        subscriber_id: subscriber.subscriber_id,
        email: request.email,
        plan_code: request.plan_code,
        back_url: state.redirect_pages.success.clone(),
    };

    let result = handler.handle(cmd).await?;
    let status = if result.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(CheckoutResponse::from(result))))
}

/// POST /api/billing/cancel - cancel a subscription
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    subscriber: AuthenticatedSubscriber,
    Json(request): Json<CancelRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription_id = request
        .subscription_id
        .parse::<SubscriptionId>()
        .map_err(|_| BillingError::validation("subscription_id", "not a valid id"))?;

    let handler = state.cancel_handler();
    let cmd = CancelSubscriptionCommand {
        subscription_id,
        actor: subscriber.cancel_actor(),
        reason: request
            .reason
            .unwrap_or_else(|| "requested by subscriber".to_string()),
    };

    handler.handle(cmd).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/billing/subscriptions/{id} - subscription details
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    subscriber: AuthenticatedSubscriber,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription_id = id
        .parse::<SubscriptionId>()
        .map_err(|_| BillingError::validation("subscription_id", "not a valid id"))?;

    let subscription = state
        .subscriptions
        .find_by_id(&subscription_id)
        .await
        .map_err(BillingError::from)?
        .ok_or(BillingError::SubscriptionNotFound(subscription_id))?;

    if subscription.subscriber_id != subscriber.subscriber_id && !subscriber.is_admin {
        return Err(BillingError::Forbidden.into());
    }

    Ok(Json(SubscriptionResponse::from(subscription)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Redirect Callbacks (browser-facing, unauthenticated)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /callbacks/payment/{outcome} - provider redirect landing
///
/// The webhook is the authoritative path; this only accelerates the UX
/// and must tolerate never being called. Failures land the browser on the
/// configured failure page with a reason code, never an error body.
pub async fn payment_redirect(
    State(state): State<BillingAppState>,
    Path(outcome): Path<String>,
    Query(query): Query<RedirectQuery>,
) -> impl IntoResponse {
    let provider_status = query
        .status
        .or(query.collection_status)
        .unwrap_or_else(|| match outcome.as_str() {
            "success" => "authorized".to_string(),
            "pending" => "pending".to_string(),
            _ => "rejected".to_string(),
        });

    let handler = state.confirm_redirect_handler();
    let cmd = ConfirmRedirectCommand {
        preapproval_id: query.preapproval_id,
        provider_status,
        external_reference: query.external_reference,
    };

    match handler.handle(cmd).await {
        Ok(ConfirmRedirectResult::Confirmed { subscription_id })
        | Ok(ConfirmRedirectResult::Unchanged { subscription_id }) => Redirect::to(&format!(
            "{}?subscription={}",
            state.redirect_pages.success, subscription_id
        )),
        Ok(ConfirmRedirectResult::StillPending { subscription_id }) => Redirect::to(&format!(
            "{}?subscription={}",
            state.redirect_pages.pending, subscription_id
        )),
        Err(e) => {
            tracing::warn!(error = %e, outcome, "redirect callback failed");
            let reason = match e {
                BillingError::CorrelationFailed(_) => "not_found",
                _ => "processing_error",
            };
            Redirect::to(&format!("{}?reason={}", state.redirect_pages.failure, reason))
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Endpoint (provider-facing)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/mercadopago - inbound provider events
pub async fn handle_webhook(
    State(state): State<BillingAppState>,
    Query(query): Query<WebhookQuery>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    // Shared-token gate, enforced when configured.
    if let Some(expected) = &state.webhook_token {
        if query.token.as_deref() != Some(expected.as_str()) {
            tracing::warn!("webhook rejected: bad or missing token");
            return Err(WebhookApiError::BadToken);
        }
    }

    let signature_header = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let handler = state.webhook_handler();
    let cmd = ProcessWebhookCommand {
        body: body.to_vec(),
        signature_header,
        request_id,
        data_id_hint: query.data_id,
    };

    // Dedup'd and ignored deliveries are 200s too: the provider only
    // needs to know whether to retry.
    handler.handle(cmd).await.map_err(WebhookApiError::from)?;
    Ok(StatusCode::OK)
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error wrapper mapping `BillingError` to HTTP responses.
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self.0 {
            BillingError::PlanNotFound(_) => (StatusCode::NOT_FOUND, "PLAN_NOT_FOUND"),
            BillingError::PlanInactive(_) => (StatusCode::CONFLICT, "PLAN_INACTIVE"),
            BillingError::SubscriptionNotFound(_)
            | BillingError::SubscriptionNotFoundForSubscriber(_) => {
                (StatusCode::NOT_FOUND, "SUBSCRIPTION_NOT_FOUND")
            }
            BillingError::CorrelationFailed(_) => (StatusCode::NOT_FOUND, "CORRELATION_FAILED"),
            BillingError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
            BillingError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            BillingError::ProviderFailed { .. } => (StatusCode::BAD_GATEWAY, "PROVIDER_FAILED"),
            BillingError::ValidationFailed { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            BillingError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorResponse::new(code, self.0.message());
        (status, Json(body)).into_response()
    }
}

/// API error wrapper for the webhook endpoint.
///
/// The status reflects whether a provider retry is productive: hard
/// rejects are 4xx, transient failures 5xx, and unproductive processing
/// failures are 200 (recorded in the ingestion log, not retried).
pub enum WebhookApiError {
    BadToken,
    Processing(WebhookError),
}

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self::Processing(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            WebhookApiError::BadToken => {
                let body = ErrorResponse::new("UNAUTHORIZED", "invalid webhook token");
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            WebhookApiError::Processing(err) => {
                let status = match &err {
                    WebhookError::Authentication(_) => StatusCode::UNAUTHORIZED,
                    WebhookError::Malformed(_) | WebhookError::Validation(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    e if e.is_retry_productive() => StatusCode::INTERNAL_SERVER_ERROR,
                    // Recorded as errored; retrying cannot help, so the
                    // provider gets an acknowledgement.
                    _ => StatusCode::OK,
                };
                let body = ErrorResponse::new(err.code(), err.to_string());
                (status, Json(body)).into_response()
            }
        }
    }
}
