//! MercadoPago API adapter.
//!
//! Implements the `PaymentProvider` port over the provider's REST API.
//!
//! # Resilience
//!
//! - Every request uses a bounded timeout
//! - Write requests carry the caller's `X-Idempotency-Key`, so the fixed
//!   retry budget (and any client-level retry) can never create duplicate
//!   financial resources
//! - Retries are capped at 2: duplicate money is worse than a surfaced
//!   failure

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::ports::{
    CreatePreapprovalRequest, CreatePreferenceRequest, PaymentProvider, Preapproval,
    PreapprovalStatus, Preference, ProviderError, ProviderPayment,
};

use super::api_types::{
    MpAutoRecurring, MpBackUrls, MpCreatePreapproval, MpCreatePreference, MpPayment,
    MpPreapproval, MpPreference, MpPreferenceItem,
};

/// Request timeout for provider calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed retry budget for failed calls.
const RETRY_BUDGET: u32 = 2;

/// MercadoPago API configuration.
#[derive(Clone)]
pub struct MercadoPagoConfig {
    /// API access token.
    access_token: SecretString,

    /// Base URL for the API (default: https://api.mercadopago.com).
    api_base_url: String,
}

impl MercadoPagoConfig {
    /// Create a new configuration.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            api_base_url: "https://api.mercadopago.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// MercadoPago payment provider adapter.
pub struct MercadoPagoAdapter {
    config: MercadoPagoConfig,
    http_client: reqwest::Client,
}

impl MercadoPagoAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: MercadoPagoConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            config,
            http_client,
        }
    }

    /// Sends a request, retrying network errors and 5xx up to the budget.
    async fn execute<F>(&self, mut build: F) -> Result<reqwest::Response, ProviderError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) if response.status().is_server_error() && attempt < RETRY_BUDGET => {
                    tracing::warn!(
                        status = %response.status(),
                        attempt,
                        "provider returned 5xx, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < RETRY_BUDGET => {
                    tracing::warn!(error = %e, attempt, "provider call failed, retrying");
                }
                Err(e) => return Err(ProviderError::network(e.to_string())),
            }
            attempt += 1;
        }
    }

    /// Decodes a response body, mapping API failures to typed errors.
    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body, "MercadoPago {} failed", context);
            return Err(ProviderError::api(format!("{}: HTTP {}", context, status)));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::decode(format!("{}: {}", context, e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn token(&self) -> &str {
        self.config.access_token.expose_secret()
    }
}

#[async_trait]
impl PaymentProvider for MercadoPagoAdapter {
    async fn create_preapproval(
        &self,
        request: CreatePreapprovalRequest,
    ) -> Result<Preapproval, ProviderError> {
        let body = MpCreatePreapproval {
            reason: request.reason,
            payer_email: request.payer_email,
            external_reference: request.external_reference,
            back_url: request.back_url,
            auto_recurring: MpAutoRecurring {
                frequency: request.frequency_months,
                frequency_type: "months".to_string(),
                transaction_amount: request.amount_minor,
                currency_id: request.currency,
            },
        };
        let url = self.url("/preapproval");
        let idempotency_key = request.idempotency_key;

        let response = self
            .execute(|| {
                self.http_client
                    .post(&url)
                    .bearer_auth(self.token())
                    .header("X-Idempotency-Key", &idempotency_key)
                    .json(&body)
            })
            .await?;

        let preapproval: MpPreapproval = self.decode(response, "create_preapproval").await?;
        Ok(to_preapproval(preapproval))
    }

    async fn get_preapproval(
        &self,
        preapproval_id: &str,
    ) -> Result<Option<Preapproval>, ProviderError> {
        let url = self.url(&format!("/preapproval/{}", preapproval_id));
        let response = self
            .execute(|| self.http_client.get(&url).bearer_auth(self.token()))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let preapproval: MpPreapproval = self.decode(response, "get_preapproval").await?;
        Ok(Some(to_preapproval(preapproval)))
    }

    async fn cancel_preapproval(&self, preapproval_id: &str) -> Result<Preapproval, ProviderError> {
        let url = self.url(&format!("/preapproval/{}", preapproval_id));
        let body = serde_json::json!({"status": "cancelled"});

        let response = self
            .execute(|| {
                self.http_client
                    .put(&url)
                    .bearer_auth(self.token())
                    .json(&body)
            })
            .await?;

        let preapproval: MpPreapproval = self.decode(response, "cancel_preapproval").await?;
        Ok(to_preapproval(preapproval))
    }

    async fn create_preference(
        &self,
        request: CreatePreferenceRequest,
    ) -> Result<Preference, ProviderError> {
        let body = MpCreatePreference {
            items: vec![MpPreferenceItem {
                title: request.title,
                quantity: 1,
                unit_price: request.amount_minor,
                currency_id: request.currency,
            }],
            external_reference: request.external_reference,
            back_urls: MpBackUrls {
                success: request.back_urls.success,
                pending: request.back_urls.pending,
                failure: request.back_urls.failure,
            },
            auto_return: "approved".to_string(),
        };
        let url = self.url("/checkout/preferences");
        let idempotency_key = request.idempotency_key;

        let response = self
            .execute(|| {
                self.http_client
                    .post(&url)
                    .bearer_auth(self.token())
                    .header("X-Idempotency-Key", &idempotency_key)
                    .json(&body)
            })
            .await?;

        let preference: MpPreference = self.decode(response, "create_preference").await?;
        Ok(Preference {
            id: preference.id,
            init_point: preference.init_point,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<ProviderPayment>, ProviderError> {
        let url = self.url(&format!("/v1/payments/{}", payment_id));
        let response = self
            .execute(|| self.http_client.get(&url).bearer_auth(self.token()))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        // Keep the raw body verbatim for the audit trail, then decode.
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body, "MercadoPago get_payment failed");
            return Err(ProviderError::api(format!("get_payment: HTTP {}", status)));
        }
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(format!("get_payment: {}", e)))?;
        let payment: MpPayment = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::decode(format!("get_payment: {}", e)))?;

        Ok(Some(ProviderPayment {
            id: payment.id_string(),
            status: payment.status,
            status_detail: payment.status_detail,
            amount_minor: payment.transaction_amount,
            currency: payment.currency_id,
            external_reference: payment.external_reference,
            preapproval_id: payment.preapproval_id,
            raw,
        }))
    }
}

fn to_preapproval(mp: MpPreapproval) -> Preapproval {
    Preapproval {
        status: PreapprovalStatus::from_provider(&mp.status),
        id: mp.id,
        init_point: mp.init_point,
        external_reference: mp.external_reference,
    }
}
