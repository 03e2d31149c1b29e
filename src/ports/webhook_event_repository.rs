//! WebhookEventRepository port - the write-ahead ingestion log.
//!
//! Every inbound webhook is persisted BEFORE processing, so a crash
//! mid-processing leaves a replayable record, and the unique event id
//! doubles as the delivery-level dedup gate. The row is updated exactly
//! once at the end of processing, with either success or the error text,
//! so replay can distinguish "never processed" from "processed with
//! error".
//!
//! The log is audit/replay data only - business logic never joins it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::DomainError;

/// A logged webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    /// Name of the provider that sent the event.
    pub provider: String,

    /// Event topic ("payment", "preapproval", ...).
    pub topic: String,

    /// Id of the resource the event refers to.
    pub data_id: String,

    /// Provider's event id; unique per logical event.
    pub event_id: String,

    /// When the delivery arrived.
    pub received_at: DateTime<Utc>,

    /// Raw request body, stored verbatim.
    pub payload: serde_json::Value,

    /// Whether processing has completed (successfully or not).
    pub processed: bool,

    /// When processing completed.
    pub processed_at: Option<DateTime<Utc>>,

    /// Error text if processing failed.
    pub error: Option<String>,
}

impl WebhookEventRecord {
    /// Creates the write-ahead record for a just-received delivery.
    pub fn received(
        provider: impl Into<String>,
        topic: impl Into<String>,
        data_id: impl Into<String>,
        event_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            provider: provider.into(),
            topic: topic.into(),
            data_id: data_id.into(),
            event_id: event_id.into(),
            received_at: Utc::now(),
            payload,
            processed: false,
            processed_at: None,
            error: None,
        }
    }
}

/// Result of attempting to record a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First time seeing this event id.
    Inserted,
    /// A record with this event id already exists (duplicate delivery).
    AlreadyExists,
}

/// How processing of a logged event ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Handled successfully (including intentionally-ignored topics).
    Succeeded,
    /// Handling failed; the text goes into the error column.
    Failed(String),
}

/// Port for the webhook ingestion log.
///
/// Implementations should use a unique constraint on event_id so
/// concurrent duplicate deliveries resolve at the storage layer.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Write-ahead: record a delivery before processing it.
    ///
    /// `ON CONFLICT DO NOTHING` semantics: returns `AlreadyExists` if
    /// another delivery of the same event won the insert race.
    async fn record_received(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Mark a recorded delivery processed, exactly once, success or not.
    async fn mark_processed(
        &self,
        event_id: &str,
        outcome: ProcessingOutcome,
    ) -> Result<(), DomainError>;

    /// Find a recorded delivery by event id.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Deliveries never marked processed (crash recovery / replay).
    async fn list_unprocessed(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError>;

    /// Delete records older than the timestamp; returns the count removed.
    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_record_starts_unprocessed() {
        let record = WebhookEventRecord::received(
            "mercadopago",
            "payment",
            "PAY1",
            "evt_1",
            serde_json::json!({"type": "payment"}),
        );

        assert!(!record.processed);
        assert!(record.processed_at.is_none());
        assert!(record.error.is_none());
        assert_eq!(record.event_id, "evt_1");
    }
}
