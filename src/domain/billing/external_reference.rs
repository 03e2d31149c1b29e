//! External reference correlation token.
//!
//! The token is attached to every provider resource we create and echoed
//! back in both the redirect callback and the webhook. It carries enough
//! to correlate the event to a subscription and to run the amount/currency
//! consistency check without a second lookup.
//!
//! One canonical, versioned encoding is produced:
//!
//! ```text
//! v2:<subscriber_uuid>:<subscription_uuid>:<amount_minor>:<currency>:<plan_code>
//! ```
//!
//! The plan code is last so it may itself contain colons. Two legacy
//! shapes are still decoded by an explicitly-tagged compatibility shim:
//! the bare `subscriber:subscription` colon pair, and a small JSON object
//! with `subscriber_id`/`subscription_id` keys. New tokens are never
//! emitted in either legacy shape.

use serde::Deserialize;
use thiserror::Error;

use crate::domain::foundation::{Currency, SubscriberId, SubscriptionId};

/// Canonical correlation token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    pub subscriber_id: SubscriberId,
    pub subscription_id: SubscriptionId,
    pub expected_amount_minor: i64,
    pub expected_currency: Currency,
    pub plan_code: String,
}

/// A decoded token, tagged by which decoder accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedReference {
    /// The canonical v2 encoding, carrying the consistency-check fields.
    Canonical(ExternalReference),
    /// A legacy encoding: correlation ids only, no expected values.
    Legacy {
        subscriber_id: SubscriberId,
        subscription_id: SubscriptionId,
    },
}

impl DecodedReference {
    /// The subscription the token correlates to.
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            DecodedReference::Canonical(r) => r.subscription_id,
            DecodedReference::Legacy {
                subscription_id, ..
            } => *subscription_id,
        }
    }

    /// The subscriber the token correlates to.
    pub fn subscriber_id(&self) -> SubscriberId {
        match self {
            DecodedReference::Canonical(r) => r.subscriber_id,
            DecodedReference::Legacy { subscriber_id, .. } => *subscriber_id,
        }
    }
}

/// Token decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("external reference is empty")]
    Empty,

    #[error("external reference is not in any known format: {0}")]
    Unrecognized(String),

    #[error("external reference field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ExternalReference {
    /// Encodes the canonical v2 token.
    pub fn encode(&self) -> String {
        format!(
            "v2:{}:{}:{}:{}:{}",
            self.subscriber_id,
            self.subscription_id,
            self.expected_amount_minor,
            self.expected_currency,
            self.plan_code
        )
    }

    /// Decodes a token in any supported format, canonical first.
    pub fn decode(raw: &str) -> Result<DecodedReference, ReferenceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }

        if let Some(rest) = raw.strip_prefix("v2:") {
            return Self::decode_v2(rest).map(DecodedReference::Canonical);
        }

        // Legacy compatibility shims below; kept only to decode tokens
        // minted before the v2 format existed.
        if raw.starts_with('{') {
            return Self::decode_legacy_json(raw);
        }
        Self::decode_legacy_pair(raw)
    }

    fn decode_v2(rest: &str) -> Result<ExternalReference, ReferenceError> {
        let mut parts = rest.splitn(5, ':');
        let subscriber = parts.next().unwrap_or_default();
        let subscription = parts.next().unwrap_or_default();
        let amount = parts.next().unwrap_or_default();
        let currency = parts.next().unwrap_or_default();
        let plan_code = parts
            .next()
            .ok_or_else(|| ReferenceError::Unrecognized("v2 token too short".to_string()))?;

        let subscriber_id = subscriber
            .parse::<SubscriberId>()
            .map_err(|e| invalid("subscriber_id", e))?;
        let subscription_id = subscription
            .parse::<SubscriptionId>()
            .map_err(|e| invalid("subscription_id", e))?;
        let expected_amount_minor = amount
            .parse::<i64>()
            .map_err(|e| invalid("expected_amount", e))?;
        let expected_currency =
            Currency::new(currency).map_err(|e| invalid("expected_currency", e))?;

        if expected_amount_minor < 0 {
            return Err(ReferenceError::InvalidField {
                field: "expected_amount".to_string(),
                reason: "negative".to_string(),
            });
        }
        if plan_code.is_empty() {
            return Err(ReferenceError::InvalidField {
                field: "plan_code".to_string(),
                reason: "empty".to_string(),
            });
        }

        Ok(ExternalReference {
            subscriber_id,
            subscription_id,
            expected_amount_minor,
            expected_currency,
            plan_code: plan_code.to_string(),
        })
    }

    fn decode_legacy_pair(raw: &str) -> Result<DecodedReference, ReferenceError> {
        let (subscriber, subscription) = raw
            .split_once(':')
            .ok_or_else(|| ReferenceError::Unrecognized(truncate(raw)))?;

        let subscriber_id = subscriber
            .parse::<SubscriberId>()
            .map_err(|_| ReferenceError::Unrecognized(truncate(raw)))?;
        let subscription_id = subscription
            .parse::<SubscriptionId>()
            .map_err(|_| ReferenceError::Unrecognized(truncate(raw)))?;

        Ok(DecodedReference::Legacy {
            subscriber_id,
            subscription_id,
        })
    }

    fn decode_legacy_json(raw: &str) -> Result<DecodedReference, ReferenceError> {
        #[derive(Deserialize)]
        struct LegacyJson {
            subscriber_id: SubscriberId,
            subscription_id: SubscriptionId,
        }

        let parsed: LegacyJson = serde_json::from_str(raw)
            .map_err(|_| ReferenceError::Unrecognized(truncate(raw)))?;

        Ok(DecodedReference::Legacy {
            subscriber_id: parsed.subscriber_id,
            subscription_id: parsed.subscription_id,
        })
    }
}

fn invalid(field: &str, err: impl std::fmt::Display) -> ReferenceError {
    ReferenceError::InvalidField {
        field: field.to_string(),
        reason: err.to_string(),
    }
}

fn truncate(raw: &str) -> String {
    raw.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExternalReference {
        ExternalReference {
            subscriber_id: SubscriberId::new(),
            subscription_id: SubscriptionId::new(),
            expected_amount_minor: 9990,
            expected_currency: Currency::new("CLP").unwrap(),
            plan_code: "premium-monthly".to_string(),
        }
    }

    #[test]
    fn canonical_token_roundtrips() {
        let reference = sample();
        let encoded = reference.encode();
        assert!(encoded.starts_with("v2:"));

        match ExternalReference::decode(&encoded).unwrap() {
            DecodedReference::Canonical(decoded) => assert_eq!(decoded, reference),
            other => panic!("expected canonical decode, got {:?}", other),
        }
    }

    #[test]
    fn plan_code_may_contain_colons() {
        let mut reference = sample();
        reference.plan_code = "premium:cl:monthly".to_string();

        match ExternalReference::decode(&reference.encode()).unwrap() {
            DecodedReference::Canonical(decoded) => {
                assert_eq!(decoded.plan_code, "premium:cl:monthly")
            }
            other => panic!("expected canonical decode, got {:?}", other),
        }
    }

    #[test]
    fn legacy_colon_pair_decodes_as_legacy() {
        let subscriber = SubscriberId::new();
        let subscription = SubscriptionId::new();
        let raw = format!("{}:{}", subscriber, subscription);

        match ExternalReference::decode(&raw).unwrap() {
            DecodedReference::Legacy {
                subscriber_id,
                subscription_id,
            } => {
                assert_eq!(subscriber_id, subscriber);
                assert_eq!(subscription_id, subscription);
            }
            other => panic!("expected legacy decode, got {:?}", other),
        }
    }

    #[test]
    fn legacy_json_decodes_as_legacy() {
        let subscriber = SubscriberId::new();
        let subscription = SubscriptionId::new();
        let raw = format!(
            r#"{{"subscriber_id":"{}","subscription_id":"{}"}}"#,
            subscriber, subscription
        );

        match ExternalReference::decode(&raw).unwrap() {
            DecodedReference::Legacy {
                subscription_id, ..
            } => assert_eq!(subscription_id, subscription),
            other => panic!("expected legacy decode, got {:?}", other),
        }
    }

    #[test]
    fn empty_token_fails() {
        assert_eq!(ExternalReference::decode("  "), Err(ReferenceError::Empty));
    }

    #[test]
    fn garbage_fails_as_unrecognized() {
        assert!(matches!(
            ExternalReference::decode("order-1234"),
            Err(ReferenceError::Unrecognized(_))
        ));
    }

    #[test]
    fn v2_with_bad_amount_reports_the_field() {
        let reference = sample();
        let tampered = reference
            .encode()
            .replace(":9990:", ":lots:");
        match ExternalReference::decode(&tampered) {
            Err(ReferenceError::InvalidField { field, .. }) => {
                assert_eq!(field, "expected_amount")
            }
            other => panic!("expected InvalidField, got {:?}", other),
        }
    }

    #[test]
    fn v2_with_bad_currency_fails() {
        let reference = sample();
        let tampered = reference.encode().replace(":CLP:", ":PESOS:");
        assert!(ExternalReference::decode(&tampered).is_err());
    }
}
