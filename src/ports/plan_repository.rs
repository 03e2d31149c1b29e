//! PlanRepository port - billing plan catalog access.
//!
//! The catalog itself is managed elsewhere; the reconciliation core only
//! needs lookups plus the one-time provider-id sync write.

use async_trait::async_trait;

use crate::domain::billing::Plan;
use crate::domain::foundation::{DomainError, PlanId};

/// Port for billing plan lookups.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Find a plan by id.
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError>;

    /// Find a plan by its unique code.
    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, DomainError>;

    /// Persist a plan (insert or update).
    async fn save(&self, plan: &Plan) -> Result<(), DomainError>;

    /// Record the provider-side plan id after the one-time sync.
    async fn set_provider_plan_id(
        &self,
        id: &PlanId,
        provider_plan_id: &str,
    ) -> Result<(), DomainError>;
}
