//! Configuration error types.

use thiserror::Error;

/// Errors loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Read(#[from] config::ConfigError),
}

/// Errors validating loaded configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required configuration value missing: {0}")]
    MissingRequired(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    #[error("production requires a webhook secret (COBRANZA__PAYMENT__WEBHOOK_SECRET)")]
    WebhookSecretRequired,

    #[error("postgres backend requires a database URL (COBRANZA__DATABASE__URL)")]
    DatabaseUrlRequired,
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
