//! Money and currency value objects.
//!
//! All monetary values are integer minor units (cents, centavos). Floats
//! never appear in money paths.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// ISO 4217 currency code, exactly three ASCII letters, stored uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// Parses a currency code, normalizing to uppercase.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFormat` unless the input is exactly
    /// three ASCII letters.
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("expected 3-letter code, got '{}'", code),
            ));
        }
        let mut upper = [0u8; 3];
        for (i, b) in bytes.iter().enumerate() {
            upper[i] = b.to_ascii_uppercase();
        }
        Ok(Self(upper))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // Invariant: constructed only from ASCII letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_string()
    }
}

/// A non-negative amount of money in minor units of a currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (cents).
    pub amount_minor: i64,

    /// Currency of the amount.
    pub currency: Currency,
}

impl Money {
    /// Creates a money value.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the amount is negative.
    pub fn new(amount_minor: i64, currency: Currency) -> Result<Self, ValidationError> {
        if amount_minor < 0 {
            return Err(ValidationError::invalid_format(
                "amount",
                format!("amount must be >= 0, got {}", amount_minor),
            ));
        }
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// True if both amount and currency match.
    pub fn matches(&self, amount_minor: i64, currency: &Currency) -> bool {
        self.amount_minor == amount_minor && &self.currency == currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount_minor, self.currency)
    }
}
