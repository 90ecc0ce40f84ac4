use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use async_trait::async_trait;
use bundlevisor_core::{OwnerId, Tier};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Repository trait for the tenant -> tier mapping
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Load every persisted plan. A missing store is an empty mapping.
    async fn load(&self) -> ControlPlaneResult<HashMap<OwnerId, Tier>>;

    /// Replace the persisted mapping.
    async fn save(&self, plans: &HashMap<OwnerId, Tier>) -> ControlPlaneResult<()>;
}

/// In-memory implementation of plan repository
#[derive(Clone, Default)]
pub struct InMemoryPlanRepository {
    storage: Arc<RwLock<HashMap<OwnerId, Tier>>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn load(&self) -> ControlPlaneResult<HashMap<OwnerId, Tier>> {
        let storage = self
            .storage
            .read()
            .map_err(|_| ControlPlaneError::StorageError("Lock poisoned".to_string()))?;
        Ok(storage.clone())
    }

    async fn save(&self, plans: &HashMap<OwnerId, Tier>) -> ControlPlaneResult<()> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| ControlPlaneError::StorageError("Lock poisoned".to_string()))?;
        *storage = plans.clone();
        Ok(())
    }
}

/// `plans.json`: an object of owner id strings to tier names.
#[derive(Debug, Clone)]
pub struct JsonFilePlanRepository {
    path: PathBuf,
}

impl JsonFilePlanRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PlanRepository for JsonFilePlanRepository {
    async fn load(&self) -> ControlPlaneResult<HashMap<OwnerId, Tier>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read plans file, starting empty");
                return Ok(HashMap::new());
            }
        };

        let entries: BTreeMap<String, String> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable plans file, starting empty");
                return Ok(HashMap::new());
            }
        };

        let mut plans = HashMap::with_capacity(entries.len());
        for (owner, tier) in entries {
            match owner.trim().parse::<OwnerId>() {
                Ok(owner_id) => {
                    plans.insert(owner_id, Tier::parse_lenient(&tier));
                }
                Err(_) => warn!(owner = %owner, "Skipping plan entry with non-numeric owner"),
            }
        }
        Ok(plans)
    }

    async fn save(&self, plans: &HashMap<OwnerId, Tier>) -> ControlPlaneResult<()> {
        let entries: BTreeMap<String, &str> = plans
            .iter()
            .map(|(owner, tier)| (owner.to_string(), tier.as_str()))
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Loads empty and rejects every save.
    pub struct FailingPlanRepository;

    #[async_trait]
    impl PlanRepository for FailingPlanRepository {
        async fn load(&self) -> ControlPlaneResult<HashMap<OwnerId, Tier>> {
            Ok(HashMap::new())
        }

        async fn save(&self, _plans: &HashMap<OwnerId, Tier>) -> ControlPlaneResult<()> {
            Err(ControlPlaneError::StorageError("disk full".to_string()))
        }
    }
}
