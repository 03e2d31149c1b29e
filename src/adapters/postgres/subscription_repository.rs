//! PostgreSQL implementation of SubscriptionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::Subscription;
use crate::domain::foundation::{
    DomainError, PlanId, SubscriberId, SubscriptionId, Timestamp,
};
use crate::ports::{ClaimOutcome, SubscriptionRepository};

use super::{parse_subscription_status, subscription_status_to_str};

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    subscriber_id: Uuid,
    plan_id: Uuid,
    status: String,
    preapproval_id: Option<String>,
    start_date: Option<DateTime<Utc>>,
    next_charge_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            subscriber_id: SubscriberId::from_uuid(row.subscriber_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            status: parse_subscription_status(&row.status)?,
            preapproval_id: row.preapproval_id,
            start_date: row.start_date.map(Timestamp::from_datetime),
            next_charge_at: row.next_charge_at.map(Timestamp::from_datetime),
            cancel_reason: row.cancel_reason,
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT: &str = r#"
    SELECT id, subscriber_id, plan_id, status, preapproval_id, start_date,
           next_charge_at, cancel_reason, cancelled_at, created_at, updated_at
    FROM subscriptions
"#;

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, subscriber_id, plan_id, status, preapproval_id, start_date,
                next_charge_at, cancel_reason, cancelled_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.subscriber_id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription_status_to_str(&subscription.status))
        .bind(&subscription.preapproval_id)
        .bind(subscription.start_date.map(|t| *t.as_datetime()))
        .bind(subscription.next_charge_at.map(|t| *t.as_datetime()))
        .bind(&subscription.cancel_reason)
        .bind(subscription.cancelled_at.map(|t| *t.as_datetime()))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save subscription: {}", e)))?;
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $2,
                preapproval_id = $3,
                start_date = $4,
                next_charge_at = $5,
                cancel_reason = $6,
                cancelled_at = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription_status_to_str(&subscription.status))
        .bind(&subscription.preapproval_id)
        .bind(subscription.start_date.map(|t| *t.as_datetime()))
        .bind(subscription.next_charge_at.map(|t| *t.as_datetime()))
        .bind(&subscription.cancel_reason)
        .bind(subscription.cancelled_at.map(|t| *t.as_datetime()))
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update subscription: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::database(format!(
                "Subscription {} not found for update",
                subscription.id
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_subscriber_and_plan(
        &self,
        subscriber_id: &SubscriberId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE subscriber_id = $1 AND plan_id = $2 ORDER BY created_at DESC LIMIT 1",
            SELECT
        ))
        .bind(subscriber_id.as_uuid())
        .bind(plan_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_preapproval_id(
        &self,
        preapproval_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE preapproval_id = $1", SELECT))
                .bind(preapproval_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn claim_preapproval(
        &self,
        id: &SubscriptionId,
        preapproval_id: &str,
    ) -> Result<ClaimOutcome, DomainError> {
        // First writer wins: the conditional update only succeeds while
        // the column is NULL; the unique index on preapproval_id guards
        // cross-subscription reuse.
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET preapproval_id = $2, updated_at = NOW()
            WHERE id = $1 AND preapproval_id IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(preapproval_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to claim preapproval: {}", e)))?;

        if result.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        // Lost the race (or retried): re-read and report the winner.
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::database(format!("Subscription {} not found", id)))?;

        if current.preapproval_id.as_deref() == Some(preapproval_id) {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::AlreadyClaimed(current))
        }
    }
}
