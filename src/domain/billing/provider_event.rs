//! Inbound webhook envelope parsing.
//!
//! The provider's webhook body is thin: a topic/type/action discriminator
//! and a `data.id` pointing at the resource that changed. Amounts and
//! statuses are fetched from the provider API during processing, never
//! trusted from the body.

use serde::Deserialize;

use super::WebhookError;

/// What kind of resource the event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTopic {
    /// A payment was created or updated.
    Payment,
    /// A recurring-charge mandate was created or updated.
    Preapproval,
    /// Anything else; acknowledged but not processed.
    Unknown(String),
}

impl EventTopic {
    fn from_raw(raw: &str) -> Self {
        // `action` values look like "payment.updated"; `topic`/`type`
        // values are bare resource names. Match on the prefix.
        let head = raw.split('.').next().unwrap_or(raw);
        match head {
            "payment" => EventTopic::Payment,
            "preapproval" | "subscription_preapproval" => EventTopic::Preapproval,
            _ => EventTopic::Unknown(raw.to_string()),
        }
    }

    /// Storage representation for the ingestion log.
    pub fn as_str(&self) -> &str {
        match self {
            EventTopic::Payment => "payment",
            EventTopic::Preapproval => "preapproval",
            EventTopic::Unknown(raw) => raw,
        }
    }
}

/// A parsed webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    /// Provider's event/delivery id, unique per logical event.
    pub event_id: String,

    /// Resource topic the event refers to.
    pub topic: EventTopic,

    /// Id of the resource that changed.
    pub data_id: String,

    /// Whether the event was generated against live credentials.
    pub live_mode: bool,
}

/// Wire shape of the webhook body.
///
/// The provider has shipped three envelope generations; all are accepted:
/// `type`, `topic`, and `action` carry the discriminator depending on age.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    id: Option<serde_json::Value>,
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    action: Option<String>,
    #[serde(default)]
    live_mode: bool,
    data: Option<RawData>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    id: Option<serde_json::Value>,
}

impl ProviderEvent {
    /// Parses a raw webhook body.
    ///
    /// `data_id_hint` is the `data.id` query parameter some envelope
    /// generations carry instead of a body field.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Malformed` for non-JSON bodies or envelopes
    /// missing both a topic discriminator and a data id.
    pub fn parse(body: &[u8], data_id_hint: Option<&str>) -> Result<Self, WebhookError> {
        let raw: RawEnvelope = serde_json::from_slice(body)
            .map_err(|e| WebhookError::Malformed(format!("invalid JSON body: {}", e)))?;

        let topic_raw = raw
            .kind
            .or(raw.topic)
            .or(raw.action)
            .ok_or_else(|| WebhookError::Malformed("missing type/topic/action".to_string()))?;

        let data_id = raw
            .data
            .and_then(|d| d.id)
            .map(stringify_id)
            .or_else(|| data_id_hint.map(|s| s.to_string()))
            .ok_or_else(|| WebhookError::Malformed("missing data.id".to_string()))?;

        let topic = EventTopic::from_raw(&topic_raw);

        // Older envelopes omit the event id; fall back to a topic-scoped
        // composite so the ingestion log still dedups per logical event.
        let event_id = raw
            .id
            .map(stringify_id)
            .unwrap_or_else(|| format!("{}:{}", topic.as_str(), data_id));

        Ok(ProviderEvent {
            event_id,
            topic,
            data_id,
            live_mode: raw.live_mode,
        })
    }
}

/// Event and data ids arrive as JSON numbers or strings depending on the
/// envelope generation.
fn stringify_id(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_envelope() {
        let body = br#"{"id": 12345, "type": "payment", "live_mode": true, "data": {"id": "PAY1"}}"#;
        let event = ProviderEvent::parse(body, None).unwrap();

        assert_eq!(event.event_id, "12345");
        assert_eq!(event.topic, EventTopic::Payment);
        assert_eq!(event.data_id, "PAY1");
        assert!(event.live_mode);
    }

    #[test]
    fn parses_action_envelope() {
        let body = br#"{"action": "payment.updated", "data": {"id": 987}}"#;
        let event = ProviderEvent::parse(body, None).unwrap();

        assert_eq!(event.topic, EventTopic::Payment);
        assert_eq!(event.data_id, "987");
    }

    #[test]
    fn parses_legacy_topic_envelope_with_query_hint() {
        let body = br#"{"topic": "preapproval"}"#;
        let event = ProviderEvent::parse(body, Some("pre_55")).unwrap();

        assert_eq!(event.topic, EventTopic::Preapproval);
        assert_eq!(event.data_id, "pre_55");
        // No event id in the body: composite fallback.
        assert_eq!(event.event_id, "preapproval:pre_55");
    }

    #[test]
    fn unknown_topic_is_preserved() {
        let body = br#"{"type": "point_integration_wh", "id": 1, "data": {"id": 2}}"#;
        let event = ProviderEvent::parse(body, None).unwrap();
        assert_eq!(
            event.topic,
            EventTopic::Unknown("point_integration_wh".to_string())
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        let result = ProviderEvent::parse(b"not json", None);
        assert!(matches!(result, Err(WebhookError::Malformed(_))));
    }

    #[test]
    fn missing_topic_is_rejected() {
        let result = ProviderEvent::parse(br#"{"data": {"id": 1}}"#, None);
        assert!(matches!(result, Err(WebhookError::Malformed(_))));
    }

    #[test]
    fn missing_data_id_everywhere_is_rejected() {
        let result = ProviderEvent::parse(br#"{"type": "payment"}"#, None);
        assert!(matches!(result, Err(WebhookError::Malformed(_))));
    }
}
