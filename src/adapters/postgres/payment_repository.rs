//! PostgreSQL implementation of PaymentRepository.
//!
//! `ON CONFLICT DO NOTHING` on the provider payment id unique index turns
//! the concurrent-duplicate race into the dedup-noop path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::Payment;
use crate::domain::foundation::{
    DomainError, InvoiceId, Money, PaymentId, SubscriberId, SubscriptionId, Timestamp,
};
use crate::ports::{PaymentInsert, PaymentRepository};

use super::{parse_currency, parse_payment_status};

/// PostgreSQL implementation of the PaymentRepository port.
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    subscription_id: Uuid,
    subscriber_id: Uuid,
    provider_payment_id: Option<String>,
    status: String,
    amount_minor: i64,
    currency: String,
    attempt: i32,
    paid_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    raw_payload: serde_json::Value,
    invoice_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        let amount = Money::new(row.amount_minor, currency)
            .map_err(|e| DomainError::database(format!("Invalid stored amount: {}", e)))?;

        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            subscriber_id: SubscriberId::from_uuid(row.subscriber_id),
            provider_payment_id: row.provider_payment_id,
            status: parse_payment_status(&row.status)?,
            amount,
            attempt: row.attempt.max(0) as u32,
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            failure_reason: row.failure_reason,
            raw_payload: row.raw_payload,
            invoice_id: row.invoice_id.map(InvoiceId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

const SELECT: &str = r#"
    SELECT id, subscription_id, subscriber_id, provider_payment_id, status,
           amount_minor, currency, attempt, paid_at, failure_reason,
           raw_payload, invoice_id, created_at
    FROM payments
"#;

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: Payment) -> Result<PaymentInsert, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, subscription_id, subscriber_id, provider_payment_id, status,
                amount_minor, currency, attempt, paid_at, failure_reason,
                raw_payload, invoice_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (provider_payment_id) DO NOTHING
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.subscription_id.as_uuid())
        .bind(payment.subscriber_id.as_uuid())
        .bind(&payment.provider_payment_id)
        .bind(payment.status.as_str())
        .bind(payment.amount.amount_minor)
        .bind(payment.amount.currency.as_str())
        .bind(payment.attempt as i32)
        .bind(payment.paid_at.map(|t| *t.as_datetime()))
        .bind(&payment.failure_reason)
        .bind(&payment.raw_payload)
        .bind(payment.invoice_id.map(|i| *i.as_uuid()))
        .bind(payment.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert payment: {}", e)))?;

        if result.rows_affected() == 1 {
            return Ok(PaymentInsert::Inserted(payment));
        }

        // Conflict: another delivery inserted this provider payment id.
        let provider_id = payment
            .provider_payment_id
            .as_deref()
            .ok_or_else(|| DomainError::database("conflict on NULL provider_payment_id"))?;
        let existing = self
            .find_by_provider_payment_id(provider_id)
            .await?
            .ok_or_else(|| {
                DomainError::database(format!(
                    "payment {} conflicted but is not readable",
                    provider_id
                ))
            })?;
        Ok(PaymentInsert::Duplicate(existing))
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{} WHERE provider_payment_id = $1", SELECT))
                .bind(provider_payment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Payment::try_from).transpose()
    }

    async fn list_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "{} WHERE subscription_id = $1 ORDER BY created_at ASC",
            SELECT
        ))
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn attach_invoice(
        &self,
        payment_id: &PaymentId,
        invoice_id: &InvoiceId,
    ) -> Result<(), DomainError> {
        sqlx::query("UPDATE payments SET invoice_id = $2 WHERE id = $1")
            .bind(payment_id.as_uuid())
            .bind(invoice_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to attach invoice: {}", e)))?;
        Ok(())
    }
}
