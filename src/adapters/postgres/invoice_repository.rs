//! PostgreSQL implementation of InvoiceRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::Invoice;
use crate::domain::foundation::{DomainError, InvoiceId, PaymentId, Timestamp};
use crate::ports::{InvoiceInsert, InvoiceRepository};

use super::parse_currency;

/// PostgreSQL implementation of the InvoiceRepository port.
pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    payment_id: Uuid,
    number: String,
    document_path: String,
    issued_at: DateTime<Utc>,
    net_minor: i64,
    tax_minor: i64,
    total_minor: i64,
    currency: String,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            payment_id: PaymentId::from_uuid(row.payment_id),
            number: row.number,
            document_path: row.document_path,
            issued_at: Timestamp::from_datetime(row.issued_at),
            net_minor: row.net_minor,
            tax_minor: row.tax_minor,
            total_minor: row.total_minor,
            currency: parse_currency(&row.currency)?,
        })
    }
}

const SELECT: &str = r#"
    SELECT id, payment_id, number, document_path, issued_at,
           net_minor, tax_minor, total_minor, currency
    FROM invoices
"#;

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn insert(&self, invoice: Invoice) -> Result<InvoiceInsert, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoices (
                id, payment_id, number, document_path, issued_at,
                net_minor, tax_minor, total_minor, currency
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.payment_id.as_uuid())
        .bind(&invoice.number)
        .bind(&invoice.document_path)
        .bind(invoice.issued_at.as_datetime())
        .bind(invoice.net_minor)
        .bind(invoice.tax_minor)
        .bind(invoice.total_minor)
        .bind(invoice.currency.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert invoice: {}", e)))?;

        if result.rows_affected() == 1 {
            return Ok(InvoiceInsert::Inserted(invoice));
        }

        let existing = self
            .find_by_payment_id(&invoice.payment_id)
            .await?
            .ok_or_else(|| {
                DomainError::database(format!(
                    "invoice for payment {} conflicted but is not readable",
                    invoice.payment_id
                ))
            })?;
        Ok(InvoiceInsert::AlreadyExists(existing))
    }

    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Invoice::try_from).transpose()
    }

    async fn find_by_payment_id(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Invoice>, DomainError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!("{} WHERE payment_id = $1", SELECT))
            .bind(payment_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Invoice::try_from).transpose()
    }
}
