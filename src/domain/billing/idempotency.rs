//! Idempotency keys for outbound provider calls.
//!
//! The provider deduplicates write requests by caller-supplied key, which
//! is what makes a retried "create preapproval" collapse into a single
//! provider-side resource. Keys must therefore be pure functions of the
//! request's identity: no randomness, no timestamps.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::foundation::{PlanId, SubscriberId, SubscriptionId};

/// A short, URL-safe, deterministic key for provider request dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derives a key from an ordered list of stable identifiers.
    ///
    /// Parts are joined with a separator that cannot appear in them, so
    /// `["ab", "c"]` and `["a", "bc"]` never collide. The digest is
    /// truncated to 32 hex chars - short enough for a header, long enough
    /// that accidental collisions are not a concern.
    pub fn derive(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]); // unit separator
        }
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    /// Key for a subscription checkout (preapproval creation).
    pub fn for_checkout(
        subscription_id: &SubscriptionId,
        subscriber_id: &SubscriberId,
        plan_id: &PlanId,
    ) -> Self {
        Self::derive(&[
            &subscription_id.to_string(),
            &subscriber_id.to_string(),
            &plan_id.to_string(),
            "redirect",
        ])
    }

    /// Key for a one-off preference tied to a card-token fingerprint.
    pub fn for_preference(
        subscription_id: &SubscriptionId,
        subscriber_id: &SubscriberId,
        card_fingerprint: &str,
    ) -> Self {
        Self::derive(&[
            &subscription_id.to_string(),
            &subscriber_id.to_string(),
            card_fingerprint,
        ])
    }

    /// The key as a header-ready string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_key() {
        let a = IdempotencyKey::derive(&["sub", "user", "plan", "redirect"]);
        let b = IdempotencyKey::derive(&["sub", "user", "plan", "redirect"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_different_key() {
        let a = IdempotencyKey::derive(&["sub-1", "user", "plan", "redirect"]);
        let b = IdempotencyKey::derive(&["sub-2", "user", "plan", "redirect"]);
        assert_ne!(a, b);
    }

    #[test]
    fn part_boundaries_matter() {
        let a = IdempotencyKey::derive(&["ab", "c"]);
        let b = IdempotencyKey::derive(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_short_and_url_safe() {
        let key = IdempotencyKey::for_checkout(
            &SubscriptionId::new(),
            &SubscriberId::new(),
            &PlanId::new(),
        );
        assert_eq!(key.as_str().len(), 32);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn checkout_key_is_stable_across_calls() {
        let subscription = SubscriptionId::new();
        let subscriber = SubscriberId::new();
        let plan = PlanId::new();

        let first = IdempotencyKey::for_checkout(&subscription, &subscriber, &plan);
        let second = IdempotencyKey::for_checkout(&subscription, &subscriber, &plan);
        assert_eq!(first, second);
    }

    #[test]
    fn checkout_and_preference_keys_differ() {
        let subscription = SubscriptionId::new();
        let subscriber = SubscriberId::new();
        let plan = PlanId::new();

        let checkout = IdempotencyKey::for_checkout(&subscription, &subscriber, &plan);
        let preference =
            IdempotencyKey::for_preference(&subscription, &subscriber, "card-fp-1");
        assert_ne!(checkout, preference);
    }
}
