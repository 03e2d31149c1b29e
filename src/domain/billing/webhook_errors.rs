//! Webhook processing error taxonomy.
//!
//! Each variant carries its boundary behavior:
//!
//! | Variant | HTTP | Provider retry productive? |
//! |---|---|---|
//! | Authentication | 401 | no |
//! | Malformed / Validation | 400 | no |
//! | Consistency | 200 (recorded as errored) | no |
//! | Correlation | 500 | yes |
//! | Downstream | 500 | yes |
//! | Database | 500 | yes |
//! | Ignored | 200 | - |

use thiserror::Error;

use super::plan::ConsistencyError;
use super::signature::SignatureError;
use crate::domain::foundation::DomainError;

/// Errors raised while ingesting and processing a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Signature or token gate failed. Hard reject, no processing.
    #[error("authentication failed: {0}")]
    Authentication(SignatureError),

    /// Body could not be parsed into a provider event.
    #[error("malformed webhook: {0}")]
    Malformed(String),

    /// Event parsed but carries invalid business values.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Provider-reported amount/currency contradicts the plan.
    #[error("consistency check failed: {0}")]
    Consistency(#[from] ConsistencyError),

    /// No subscription/subscriber could be resolved for the event.
    #[error("correlation failed: {0}")]
    Correlation(String),

    /// The provider API call made during processing failed.
    #[error("provider call failed: {0}")]
    Downstream(String),

    /// Storage failure mid-processing.
    #[error("storage failure: {0}")]
    Database(String),

    /// Event acknowledged but intentionally not processed.
    #[error("event ignored: {0}")]
    Ignored(String),
}

impl WebhookError {
    /// Whether a provider redelivery of the same event could succeed.
    ///
    /// Drives the HTTP status returned to the provider: productive
    /// failures return 5xx so the provider retries; unproductive ones are
    /// recorded and acknowledged.
    pub fn is_retry_productive(&self) -> bool {
        matches!(
            self,
            WebhookError::Correlation(_)
                | WebhookError::Downstream(_)
                | WebhookError::Database(_)
        )
    }

    /// Short code stored in the ingestion log's error column.
    pub fn code(&self) -> String {
        match self {
            WebhookError::Authentication(e) => e.code().to_string(),
            WebhookError::Malformed(_) => "malformed".to_string(),
            WebhookError::Validation(_) => "validation".to_string(),
            WebhookError::Consistency(e) => e.code().to_string(),
            WebhookError::Correlation(_) => "correlation".to_string(),
            WebhookError::Downstream(_) => "downstream".to_string(),
            WebhookError::Database(_) => "database".to_string(),
            WebhookError::Ignored(_) => "ignored".to_string(),
        }
    }
}

impl From<SignatureError> for WebhookError {
    fn from(err: SignatureError) -> Self {
        WebhookError::Authentication(err)
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_failures_are_not_retried() {
        let err = WebhookError::Consistency(ConsistencyError::AmountMismatch {
            expected: 9990,
            actual: 5000,
        });
        assert!(!err.is_retry_productive());
        assert_eq!(err.code(), "amount_mismatch");
    }

    #[test]
    fn correlation_failures_are_retried() {
        let err = WebhookError::Correlation("no subscription for pre_1".to_string());
        assert!(err.is_retry_productive());
    }

    #[test]
    fn downstream_and_database_failures_are_retried() {
        assert!(WebhookError::Downstream("timeout".to_string()).is_retry_productive());
        assert!(WebhookError::Database("pool exhausted".to_string()).is_retry_productive());
    }

    #[test]
    fn authentication_failures_are_not_retried() {
        let err = WebhookError::Authentication(SignatureError::Mismatch);
        assert!(!err.is_retry_productive());
        assert_eq!(err.code(), "mismatch");
    }
}
