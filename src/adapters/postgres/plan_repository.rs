//! PostgreSQL implementation of PlanRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{BillingCycle, Plan};
use crate::domain::foundation::{DomainError, ErrorCode, Money, PlanId};
use crate::ports::PlanRepository;

use super::parse_currency;

/// PostgreSQL implementation of the PlanRepository port.
pub struct PostgresPlanRepository {
    pool: PgPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    code: String,
    name: String,
    price_minor: i64,
    currency: String,
    billing_cycle: String,
    trial_days: i32,
    active: bool,
    provider_plan_id: Option<String>,
}

impl TryFrom<PlanRow> for Plan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        let price = Money::new(row.price_minor, currency)
            .map_err(|e| DomainError::database(format!("Invalid stored price: {}", e)))?;
        let billing_cycle = match row.billing_cycle.as_str() {
            "monthly" => BillingCycle::Monthly,
            "annual" => BillingCycle::Annual,
            other => {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Invalid billing cycle value: {}", other),
                ))
            }
        };

        Ok(Plan {
            id: PlanId::from_uuid(row.id),
            code: row.code,
            name: row.name,
            price,
            billing_cycle,
            trial_days: row.trial_days.max(0) as u16,
            active: row.active,
            provider_plan_id: row.provider_plan_id,
        })
    }
}

fn billing_cycle_to_str(cycle: &BillingCycle) -> &'static str {
    match cycle {
        BillingCycle::Monthly => "monthly",
        BillingCycle::Annual => "annual",
    }
}

const SELECT: &str = r#"
    SELECT id, code, name, price_minor, currency, billing_cycle,
           trial_days, active, provider_plan_id
    FROM plans
"#;

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Plan::try_from).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(&format!("{} WHERE code = $1", SELECT))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        row.map(Plan::try_from).transpose()
    }

    async fn save(&self, plan: &Plan) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO plans (
                id, code, name, price_minor, currency, billing_cycle,
                trial_days, active, provider_plan_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_minor = EXCLUDED.price_minor,
                currency = EXCLUDED.currency,
                billing_cycle = EXCLUDED.billing_cycle,
                trial_days = EXCLUDED.trial_days,
                active = EXCLUDED.active,
                provider_plan_id = EXCLUDED.provider_plan_id
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(&plan.code)
        .bind(&plan.name)
        .bind(plan.price.amount_minor)
        .bind(plan.price.currency.as_str())
        .bind(billing_cycle_to_str(&plan.billing_cycle))
        .bind(plan.trial_days as i32)
        .bind(plan.active)
        .bind(&plan.provider_plan_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save plan: {}", e)))?;
        Ok(())
    }

    async fn set_provider_plan_id(
        &self,
        id: &PlanId,
        provider_plan_id: &str,
    ) -> Result<(), DomainError> {
        sqlx::query("UPDATE plans SET provider_plan_id = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(provider_plan_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to set provider plan id: {}", e)))?;
        Ok(())
    }
}
