//! Payment provider configuration (MercadoPago).

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Payment provider configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfig {
    /// Provider API access token.
    pub access_token: String,

    /// Webhook signature secret. Optional outside production; required in
    /// production (the verifier refuses to bypass there).
    pub webhook_secret: Option<String>,

    /// Shared secret token enforced on webhook query strings, if set.
    pub webhook_token: Option<String>,

    /// Front-end page for successful checkouts.
    #[serde(default = "default_success_url")]
    pub success_url: String,

    /// Front-end page for pending checkouts.
    #[serde(default = "default_pending_url")]
    pub pending_url: String,

    /// Front-end page for failed checkouts.
    #[serde(default = "default_failure_url")]
    pub failure_url: String,
}

fn default_success_url() -> String {
    "/pago/exitoso".to_string()
}

fn default_pending_url() -> String {
    "/pago/pendiente".to_string()
}

fn default_failure_url() -> String {
    "/pago/fallido".to_string()
}

impl PaymentConfig {
    /// Validate payment configuration against the environment.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.access_token.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__ACCESS_TOKEN"));
        }
        // A missing webhook secret outside production downgrades to a
        // loud bypass; in production it is a configuration error.
        if *environment == Environment::Production
            && self.webhook_secret.as_deref().unwrap_or("").is_empty()
        {
            return Err(ValidationError::WebhookSecretRequired);
        }
        Ok(())
    }
}
