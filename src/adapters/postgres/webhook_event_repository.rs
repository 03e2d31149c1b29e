//! PostgreSQL implementation of WebhookEventRepository.
//!
//! The PRIMARY KEY on event_id makes the write-ahead insert double as the
//! delivery-level dedup gate under concurrent deliveries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::DomainError;
use crate::ports::{
    ProcessingOutcome, SaveResult, WebhookEventRecord, WebhookEventRepository,
};

/// PostgreSQL implementation of the WebhookEventRepository port.
pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    provider: String,
    topic: String,
    data_id: String,
    event_id: String,
    received_at: DateTime<Utc>,
    payload: serde_json::Value,
    processed: bool,
    processed_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl From<WebhookEventRow> for WebhookEventRecord {
    fn from(row: WebhookEventRow) -> Self {
        WebhookEventRecord {
            provider: row.provider,
            topic: row.topic,
            data_id: row.data_id,
            event_id: row.event_id,
            received_at: row.received_at,
            payload: row.payload,
            processed: row.processed,
            processed_at: row.processed_at,
            error: row.error,
        }
    }
}

const SELECT: &str = r#"
    SELECT provider, topic, data_id, event_id, received_at, payload,
           processed, processed_at, error
    FROM webhook_events
"#;

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn record_received(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                event_id, provider, topic, data_id, received_at, payload,
                processed, processed_at, error
            ) VALUES ($1, $2, $3, $4, $5, $6, FALSE, NULL, NULL)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&record.event_id)
        .bind(&record.provider)
        .bind(&record.topic)
        .bind(&record.data_id)
        .bind(record.received_at)
        .bind(&record.payload)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record webhook event: {}", e)))?;

        if result.rows_affected() == 1 {
            Ok(SaveResult::Inserted)
        } else {
            Ok(SaveResult::AlreadyExists)
        }
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        outcome: ProcessingOutcome,
    ) -> Result<(), DomainError> {
        let error = match outcome {
            ProcessingOutcome::Succeeded => None,
            ProcessingOutcome::Failed(e) => Some(e),
        };
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = TRUE, processed_at = NOW(), error = $2
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(&error)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to mark event processed: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::database(format!(
                "Webhook event {} not recorded",
                event_id
            )));
        }
        Ok(())
    }

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> =
            sqlx::query_as(&format!("{} WHERE event_id = $1", SELECT))
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(e.to_string()))?;
        Ok(row.map(WebhookEventRecord::from))
    }

    async fn list_unprocessed(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError> {
        let rows: Vec<WebhookEventRow> = sqlx::query_as(&format!(
            "{} WHERE processed = FALSE ORDER BY received_at ASC LIMIT $1",
            SELECT
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;
        Ok(rows.into_iter().map(WebhookEventRecord::from).collect())
    }

    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1")
            .bind(timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
