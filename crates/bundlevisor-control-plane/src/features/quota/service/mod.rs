use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use bundlevisor_core::{OwnerId, QuotaDecision, Tier};
use bundlevisor_supervisor::BundleLayout;
use tracing::{debug, warn};

/// Quota Enforcer. Counts owned bundle directories on disk on every check,
/// so the count survives supervisor restarts.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuotaEnforcer;

impl QuotaEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Instances currently owned by `owner_id`, not counting `replacing`.
    pub fn current_count(
        &self,
        layout: &BundleLayout,
        owner_id: OwnerId,
        replacing: Option<&str>,
    ) -> ControlPlaneResult<usize> {
        let owned = layout.owned_by(owner_id)?;
        Ok(owned
            .iter()
            .filter(|id| Some(id.as_str()) != replacing)
            .count())
    }

    /// Decide whether `owner_id` may create one more instance.
    ///
    /// A re-upload replacing an existing instance is not a new instance and
    /// is excluded from the count.
    pub fn check_and_reserve(
        &self,
        layout: &BundleLayout,
        owner_id: OwnerId,
        tier: Tier,
        replacing: Option<&str>,
    ) -> ControlPlaneResult<QuotaDecision> {
        let current = self.current_count(layout, owner_id, replacing)?;
        let decision = QuotaDecision::evaluate(current, tier);
        match decision {
            QuotaDecision::Allowed => {
                debug!(owner_id, %tier, current, "Quota check passed")
            }
            QuotaDecision::Denied { current, limit } => {
                warn!(owner_id, %tier, current, limit, "Quota exceeded")
            }
        }
        Ok(decision)
    }

    /// Like [`check_and_reserve`](Self::check_and_reserve) but turns a
    /// denial into [`ControlPlaneError::QuotaExceeded`].
    pub fn enforce(
        &self,
        layout: &BundleLayout,
        owner_id: OwnerId,
        tier: Tier,
        replacing: Option<&str>,
    ) -> ControlPlaneResult<()> {
        match self.check_and_reserve(layout, owner_id, tier, replacing)? {
            QuotaDecision::Allowed => Ok(()),
            QuotaDecision::Denied { current, limit } => Err(ControlPlaneError::QuotaExceeded {
                current,
                limit,
                tier,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn layout_with(ids: &[&str]) -> (TempDir, BundleLayout) {
        let dir = TempDir::new().unwrap();
        let layout = BundleLayout::new(dir.path());
        for id in ids {
            std::fs::create_dir(layout.bundle_dir(id)).unwrap();
        }
        (dir, layout)
    }

    #[test]
    fn test_free_tier_allows_first_instance_only() {
        let (_dir, layout) = layout_with(&[]);
        let quota = QuotaEnforcer::new();
        assert!(quota
            .check_and_reserve(&layout, 1, Tier::Free, None)
            .unwrap()
            .is_allowed());

        std::fs::create_dir(layout.bundle_dir("1_a")).unwrap();
        assert_eq!(
            quota.check_and_reserve(&layout, 1, Tier::Free, None).unwrap(),
            QuotaDecision::Denied {
                current: 1,
                limit: 1
            }
        );
    }

    #[test]
    fn test_other_owners_do_not_count() {
        let (_dir, layout) = layout_with(&["2_a", "21_b", "12_c"]);
        let quota = QuotaEnforcer::new();
        assert_eq!(quota.current_count(&layout, 1, None).unwrap(), 0);
        assert!(quota.enforce(&layout, 1, Tier::Free, None).is_ok());
    }

    #[test]
    fn test_replacement_is_excluded() {
        let (_dir, layout) = layout_with(&["1_a"]);
        let quota = QuotaEnforcer::new();
        assert!(quota.enforce(&layout, 1, Tier::Free, Some("1_a")).is_ok());

        let err = quota.enforce(&layout, 1, Tier::Free, Some("1_b")).unwrap_err();
        assert!(matches!(
            err,
            ControlPlaneError::QuotaExceeded {
                current: 1,
                limit: 1,
                tier: Tier::Free
            }
        ));
    }

    #[test]
    fn test_vip_is_unbounded() {
        let ids: Vec<String> = (0..20).map(|i| format!("3_{i:02}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let (_dir, layout) = layout_with(&refs);
        assert!(QuotaEnforcer::new()
            .enforce(&layout, 3, Tier::Vip, None)
            .is_ok());
    }

    proptest! {
        #[test]
        fn prop_denied_exactly_at_limit(existing in 0usize..6, tier_idx in 0usize..3) {
            let tier = [Tier::Free, Tier::Premium, Tier::Vip][tier_idx];
            let ids: Vec<String> = (0..existing).map(|i| format!("9_{i}")).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let (_dir, layout) = layout_with(&refs);

            let decision = QuotaEnforcer::new()
                .check_and_reserve(&layout, 9, tier, None)
                .unwrap();
            let expected_allowed = tier.max_instances().map_or(true, |limit| existing < limit);
            prop_assert_eq!(decision.is_allowed(), expected_allowed);
        }
    }
}
