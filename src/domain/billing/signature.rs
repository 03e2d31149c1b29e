//! Webhook signature verification.
//!
//! The provider signs each webhook delivery with HMAC-SHA256 over a
//! canonical manifest built from the data id, the delivery's request id,
//! and the timestamp carried in the signature header:
//!
//! ```text
//! id:<data_id>;request-id:<request_id>;ts:<timestamp>;
//! ```
//!
//! Verification is a hard gate: a webhook that fails it is rejected with
//! an authentication error and never reaches processing.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age for a signed delivery (5 minutes).
const MAX_SIGNATURE_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Verification failure, with a stable reason code per variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing_header: no signature header present")]
    MissingHeader,

    #[error("malformed_header: {0}")]
    MalformedHeader(String),

    #[error("mismatch: signature does not match the canonical manifest")]
    Mismatch,

    #[error("mismatch: delivery timestamp outside the acceptance window")]
    TimestampOutOfRange,

    #[error("missing_header: no webhook secret configured in production")]
    SecretRequired,
}

impl SignatureError {
    /// Stable reason code for the ingestion log.
    pub fn code(&self) -> &'static str {
        match self {
            SignatureError::MissingHeader | SignatureError::SecretRequired => "missing_header",
            SignatureError::MalformedHeader(_) => "malformed_header",
            SignatureError::Mismatch | SignatureError::TimestampOutOfRange => "mismatch",
        }
    }
}

/// Parsed components of the signature header.
///
/// Format: `ts=<unix_seconds>,v1=<hex_hmac>`. Unknown fields are ignored
/// for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// HMAC-SHA256 signature bytes.
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses a signature header string.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::MalformedHeader` if the format is invalid.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=').ok_or_else(|| {
                SignatureError::MalformedHeader("expected key=value pairs".to_string())
            })?;

            match key {
                "ts" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        SignatureError::MalformedHeader("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        SignatureError::MalformedHeader("invalid signature hex".to_string())
                    })?);
                }
                _ => {
                    // Ignore unknown fields for forward compatibility
                }
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| SignatureError::MalformedHeader("missing ts".to_string()))?;
        let v1_signature = v1_signature
            .ok_or_else(|| SignatureError::MalformedHeader("missing v1".to_string()))?;

        Ok(SignatureHeader {
            timestamp,
            v1_signature,
        })
    }
}

/// Verifier for inbound webhook signatures.
pub struct WebhookSignatureVerifier {
    secret: Option<SecretString>,
    production: bool,
}

impl WebhookSignatureVerifier {
    /// Creates a verifier with the configured secret.
    ///
    /// `production` controls whether a missing secret is a bypass
    /// (development, loudly logged) or a verification failure.
    pub fn new(secret: Option<SecretString>, production: bool) -> Self {
        Self { secret, production }
    }

    /// Verifies a delivery against the canonical manifest.
    ///
    /// Pure over its inputs except for reading the clock for the replay
    /// window check.
    ///
    /// # Errors
    ///
    /// - `MissingHeader` - no header supplied while a secret is configured
    /// - `MalformedHeader` - header present but unparseable
    /// - `TimestampOutOfRange` - signature older than 5 min or from the future
    /// - `Mismatch` - recomputed HMAC differs
    /// - `SecretRequired` - production mode without a configured secret
    pub fn verify(
        &self,
        data_id: &str,
        request_id: &str,
        header: Option<&str>,
    ) -> Result<(), SignatureError> {
        let secret = match &self.secret {
            Some(secret) => secret,
            None if self.production => return Err(SignatureError::SecretRequired),
            None => {
                tracing::warn!(
                    "webhook signature verification BYPASSED: no secret configured \
                     (permitted outside production only)"
                );
                return Ok(());
            }
        };

        let header = header.ok_or(SignatureError::MissingHeader)?;
        let parsed = SignatureHeader::parse(header)?;

        self.check_timestamp(parsed.timestamp)?;

        let manifest = canonical_manifest(data_id, request_id, parsed.timestamp);
        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(manifest.as_bytes());
        let expected = mac.finalize().into_bytes();

        if !constant_time_compare(expected.as_slice(), &parsed.v1_signature) {
            tracing::warn!(request_id, "webhook signature mismatch");
            return Err(SignatureError::Mismatch);
        }

        Ok(())
    }

    fn check_timestamp(&self, timestamp: i64) -> Result<(), SignatureError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > MAX_SIGNATURE_AGE_SECS {
            tracing::warn!(
                signature_ts = timestamp,
                age_secs = age,
                "webhook signature too old - possible replay"
            );
            return Err(SignatureError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            tracing::warn!(
                signature_ts = timestamp,
                "webhook signature timestamp in the future"
            );
            return Err(SignatureError::TimestampOutOfRange);
        }
        Ok(())
    }
}

/// Builds the canonical manifest the provider signs.
///
/// Alphanumeric data ids are lowercased before inclusion, matching the
/// provider's signing rules.
fn canonical_manifest(data_id: &str, request_id: &str, timestamp: i64) -> String {
    format!(
        "id:{};request-id:{};ts:{};",
        data_id.to_ascii_lowercase(),
        request_id,
        timestamp
    )
}

/// Constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes a valid signature header for test fixtures.
#[cfg(test)]
pub fn sign_for_tests(secret: &str, data_id: &str, request_id: &str, timestamp: i64) -> String {
    let manifest = canonical_manifest(data_id, request_id, timestamp);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(manifest.as_bytes());
    format!("ts={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
