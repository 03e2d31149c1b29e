//! Wire types for the MercadoPago REST API.
//!
//! Only the fields this service reads are modeled; everything else in the
//! provider's responses is ignored by serde. Amounts are integer minor
//! units end to end.

use serde::{Deserialize, Serialize};

/// Recurring-charge terms inside a preapproval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpAutoRecurring {
    /// Charge frequency count (used with `frequency_type`).
    pub frequency: u32,

    /// "months" for subscription billing.
    pub frequency_type: String,

    /// Amount charged per cycle, minor units.
    pub transaction_amount: i64,

    /// ISO currency code.
    pub currency_id: String,
}

/// Preapproval resource.
#[derive(Debug, Clone, Deserialize)]
pub struct MpPreapproval {
    pub id: String,
    pub status: String,
    pub init_point: String,
    pub external_reference: Option<String>,
    pub auto_recurring: Option<MpAutoRecurring>,
}

/// Body for creating a preapproval.
#[derive(Debug, Clone, Serialize)]
pub struct MpCreatePreapproval {
    pub reason: String,
    pub payer_email: String,
    pub external_reference: String,
    pub back_url: String,
    pub auto_recurring: MpAutoRecurring,
}

/// Checkout preference resource.
#[derive(Debug, Clone, Deserialize)]
pub struct MpPreference {
    pub id: String,
    pub init_point: String,
}

/// Back-URLs attached to a preference.
#[derive(Debug, Clone, Serialize)]
pub struct MpBackUrls {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

/// A single preference line item.
#[derive(Debug, Clone, Serialize)]
pub struct MpPreferenceItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub currency_id: String,
}

/// Body for creating a preference.
#[derive(Debug, Clone, Serialize)]
pub struct MpCreatePreference {
    pub items: Vec<MpPreferenceItem>,
    pub external_reference: String,
    pub back_urls: MpBackUrls,
    pub auto_return: String,
}

/// Payment resource.
#[derive(Debug, Clone, Deserialize)]
pub struct MpPayment {
    /// Numeric in the provider's API; stringified for internal use.
    pub id: serde_json::Value,
    pub status: String,
    pub status_detail: Option<String>,
    pub transaction_amount: i64,
    pub currency_id: String,
    pub external_reference: Option<String>,
    /// Present when the charge was made under a recurring mandate.
    pub preapproval_id: Option<String>,
}

impl MpPayment {
    /// Provider payment ids arrive as JSON numbers; normalize to string.
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_with_numeric_id_parses() {
        let payment: MpPayment = serde_json::from_value(serde_json::json!({
            "id": 123456789,
            "status": "approved",
            "status_detail": "accredited",
            "transaction_amount": 9990,
            "currency_id": "CLP",
            "external_reference": "v2:...",
            "preapproval_id": "pre_1"
        }))
        .unwrap();

        assert_eq!(payment.id_string(), "123456789");
        assert_eq!(payment.transaction_amount, 9990);
    }

    #[test]
    fn preapproval_ignores_unknown_fields() {
        let preapproval: MpPreapproval = serde_json::from_value(serde_json::json!({
            "id": "pre_1",
            "status": "authorized",
            "init_point": "https://www.mercadopago.cl/subscriptions/checkout?preapproval_id=pre_1",
            "payer_id": 42,
            "collector_id": 77,
            "date_created": "2024-01-15T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(preapproval.id, "pre_1");
        assert!(preapproval.external_reference.is_none());
    }
}
