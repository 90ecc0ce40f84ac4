use crate::features::tenant_plans::repo::PlanRepository;
use crate::shared::error::ControlPlaneResult;
use bundlevisor_core::{OwnerId, PlanOp, Tier};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Tenant -> tier mapping, cached in memory and written through on change.
pub struct TenantPlanService {
    repo: Arc<dyn PlanRepository>,
    plans: HashMap<OwnerId, Tier>,
}

impl TenantPlanService {
    pub async fn load(repo: Arc<dyn PlanRepository>) -> ControlPlaneResult<Self> {
        let plans = repo.load().await?;
        info!(tenants = plans.len(), "Tenant plans loaded");
        Ok(Self { repo, plans })
    }

    /// Tier of `owner_id`; tenants without an entry are on `free`.
    pub fn tier_of(&self, owner_id: OwnerId) -> Tier {
        self.plans.get(&owner_id).copied().unwrap_or_default()
    }

    /// Make `owner_id` a known tenant. Returns `true` when newly added.
    pub async fn register(&mut self, owner_id: OwnerId) -> ControlPlaneResult<bool> {
        if self.plans.contains_key(&owner_id) {
            return Ok(false);
        }
        self.commit(owner_id, Tier::Free).await?;
        info!(owner_id, "Registered new tenant");
        Ok(true)
    }

    /// Grant sets the tier; revoke drops the tenant back to `free`.
    pub async fn apply(
        &mut self,
        op: PlanOp,
        tier: Tier,
        owner_id: OwnerId,
    ) -> ControlPlaneResult<Tier> {
        let new_tier = match op {
            PlanOp::Grant => tier,
            PlanOp::Revoke => Tier::Free,
        };
        let previous = self.commit(owner_id, new_tier).await?;
        info!(
            owner_id,
            %op,
            requested = %tier,
            previous = ?previous,
            current = %new_tier,
            "Tenant plan changed"
        );
        Ok(new_tier)
    }

    /// Persist the change first; the cache only follows a successful save.
    async fn commit(&mut self, owner_id: OwnerId, tier: Tier) -> ControlPlaneResult<Option<Tier>> {
        let mut staged = self.plans.clone();
        let previous = staged.insert(owner_id, tier);
        self.repo.save(&staged).await?;
        self.plans = staged;
        Ok(previous)
    }

    /// Known tenants sorted by id.
    pub fn tenants(&self) -> Vec<(OwnerId, Tier)> {
        let mut tenants: Vec<(OwnerId, Tier)> =
            self.plans.iter().map(|(owner, tier)| (*owner, *tier)).collect();
        tenants.sort_by_key(|(owner, _)| *owner);
        tenants
    }
}
