//! Billing plan catalog entry.
//!
//! Plans are owned by the surrounding catalog service; the reconciliation
//! core only reads them, as the source of the expected amount and currency
//! every inbound payment event is checked against.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{Currency, Money, PlanId, Timestamp, ValidationError};

/// How often a subscription on this plan is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Annual,
}

impl BillingCycle {
    /// Length of one cycle in calendar months.
    pub fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Annual => 12,
        }
    }

    /// Computes the next charge date one cycle after the given start.
    pub fn next_charge_from(&self, start: Timestamp) -> Timestamp {
        start.add_months(self.months())
    }
}

/// Mismatch between a provider-reported payment and the plan's expectation.
///
/// Distinct variants so callers can surface `amount_mismatch` vs
/// `currency_mismatch` reason codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("amount_mismatch: expected {expected} minor units, event reported {actual}")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("currency_mismatch: expected {expected}, event reported {actual}")]
    CurrencyMismatch { expected: String, actual: String },
}

impl ConsistencyError {
    /// Stable reason code for logs and the webhook ingestion log.
    pub fn code(&self) -> &'static str {
        match self {
            ConsistencyError::AmountMismatch { .. } => "amount_mismatch",
            ConsistencyError::CurrencyMismatch { .. } => "currency_mismatch",
        }
    }
}

/// A billing plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier.
    pub id: PlanId,

    /// Unique, human-assigned plan code (e.g. "premium-monthly").
    pub code: String,

    /// Display name.
    pub name: String,

    /// Price per cycle.
    pub price: Money,

    /// Charge frequency.
    pub billing_cycle: BillingCycle,

    /// Free-trial length in days (0 = no trial).
    pub trial_days: u16,

    /// Whether new subscriptions may be started on this plan.
    pub active: bool,

    /// Provider-side plan id, set after a one-time sync.
    pub provider_plan_id: Option<String>,
}

impl Plan {
    /// Creates a plan, validating the code and price invariants.
    pub fn new(
        id: PlanId,
        code: impl Into<String>,
        name: impl Into<String>,
        price: Money,
        billing_cycle: BillingCycle,
        trial_days: u16,
    ) -> Result<Self, ValidationError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(ValidationError::empty_field("code"));
        }
        Ok(Self {
            id,
            code,
            name: name.into(),
            price,
            billing_cycle,
            trial_days,
            active: true,
            provider_plan_id: None,
        })
    }

    /// Checks a provider-reported amount and currency against this plan.
    ///
    /// This is the gate that keeps a forged or corrupted event from
    /// crediting the wrong amount.
    pub fn check_consistency(
        &self,
        amount_minor: i64,
        currency: &Currency,
    ) -> Result<(), ConsistencyError> {
        if &self.price.currency != currency {
            return Err(ConsistencyError::CurrencyMismatch {
                expected: self.price.currency.to_string(),
                actual: currency.to_string(),
            });
        }
        if self.price.amount_minor != amount_minor {
            return Err(ConsistencyError::AmountMismatch {
                expected: self.price.amount_minor,
                actual: amount_minor,
            });
        }
        Ok(())
    }
}
