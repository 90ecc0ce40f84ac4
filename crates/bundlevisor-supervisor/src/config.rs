use crate::resolver::ResolverConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;
pub const DEFAULT_FLEET_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FLEET_OUTPUT_LIMIT: usize = 200_000;

/// Supervisor settings derived from the data directory.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub bundles_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub resolver: ResolverConfig,
    pub stop_grace: Duration,
    pub fleet_timeout: Duration,
    pub fleet_output_limit: usize,
}

impl SupervisorConfig {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            bundles_dir: data_dir.join("bundles"),
            logs_dir: data_dir.join("logs"),
            resolver: ResolverConfig::default(),
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
            fleet_timeout: Duration::from_secs(DEFAULT_FLEET_TIMEOUT_SECS),
            fleet_output_limit: DEFAULT_FLEET_OUTPUT_LIMIT,
        }
    }

    pub fn from_env(data_dir: &Path) -> Self {
        let stop_grace_secs = env_parse("BUNDLEVISOR_STOP_GRACE_SECS", DEFAULT_STOP_GRACE_SECS);
        let fleet_timeout_secs =
            env_parse("BUNDLEVISOR_FLEET_TIMEOUT_SECS", DEFAULT_FLEET_TIMEOUT_SECS);

        Self {
            resolver: ResolverConfig::from_env(),
            stop_grace: Duration::from_secs(stop_grace_secs),
            fleet_timeout: Duration::from_secs(fleet_timeout_secs),
            fleet_output_limit: env_parse(
                "BUNDLEVISOR_FLEET_OUTPUT_LIMIT",
                DEFAULT_FLEET_OUTPUT_LIMIT,
            ),
            ..Self::new(data_dir)
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}
