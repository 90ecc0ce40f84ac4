use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use bundlevisor_core::OwnerId;
use bundlevisor_supervisor::SupervisorConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "./bundlevisor-data";
pub const DEFAULT_INLINE_TEXT_LIMIT: usize = 3500;
pub const DEFAULT_LOG_TAIL_LINES: usize = 30;
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub operator_id: OwnerId,
    pub data_dir: PathBuf,
    pub supervisor: SupervisorConfig,
    pub inline_text_limit: usize,
    pub log_tail_lines: usize,
}

impl ControlPlaneConfig {
    pub fn new(operator_id: OwnerId, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            operator_id,
            supervisor: SupervisorConfig::new(&data_dir),
            data_dir,
            inline_text_limit: DEFAULT_INLINE_TEXT_LIMIT,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }

    pub fn from_env() -> ControlPlaneResult<Self> {
        let operator_raw = std::env::var("BUNDLEVISOR_OPERATOR_ID").map_err(|_| {
            ControlPlaneError::Configuration("BUNDLEVISOR_OPERATOR_ID is not set".to_string())
        })?;
        let operator_id = operator_raw.trim().parse::<OwnerId>().map_err(|_| {
            ControlPlaneError::Configuration(format!(
                "BUNDLEVISOR_OPERATOR_ID must be an integer, got '{operator_raw}'"
            ))
        })?;

        let data_dir = std::env::var("BUNDLEVISOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(Self {
            supervisor: SupervisorConfig::from_env(&data_dir),
            inline_text_limit: std::env::var("BUNDLEVISOR_INLINE_TEXT_LIMIT")
                .ok()
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(DEFAULT_INLINE_TEXT_LIMIT),
            log_tail_lines: std::env::var("BUNDLEVISOR_LOG_TAIL_LINES")
                .ok()
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(DEFAULT_LOG_TAIL_LINES),
            ..Self::new(operator_id, data_dir)
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn plans_path(&self) -> PathBuf {
        self.data_dir.join("plans.json")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.data_dir.join("cursor.txt")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.data_dir.join("outbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_data_dir() {
        let config = ControlPlaneConfig::new(1, "/srv/bv");
        assert_eq!(config.plans_path(), PathBuf::from("/srv/bv/plans.json"));
        assert_eq!(config.cursor_path(), PathBuf::from("/srv/bv/cursor.txt"));
        assert_eq!(config.outbox_dir(), PathBuf::from("/srv/bv/outbox"));
        assert_eq!(
            config.supervisor.bundles_dir,
            PathBuf::from("/srv/bv/bundles")
        );
        assert_eq!(config.inline_text_limit, 3500);
        assert_eq!(config.log_tail_lines, 30);
    }
}
