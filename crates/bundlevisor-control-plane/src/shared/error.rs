use bundlevisor_core::{CoreError, Tier};
use thiserror::Error;

/// Control plane specific errors
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("Quota exceeded: {current}/{limit} instances on the {tier} plan")]
    QuotaExceeded {
        current: usize,
        limit: usize,
        tier: Tier,
    },
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Archive error: {0}")]
    ArchiveError(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ControlPlaneError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ControlPlaneError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            ControlPlaneError::MalformedInput(_) => "MALFORMED_INPUT",
            ControlPlaneError::PermissionDenied(_) => "PERMISSION_DENIED",
            ControlPlaneError::StorageError(_) => "STORAGE_ERROR",
            ControlPlaneError::ArchiveError(_) => "ARCHIVE_ERROR",
            ControlPlaneError::Transport(_) => "TRANSPORT_ERROR",
            ControlPlaneError::Configuration(_) => "CONFIGURATION_ERROR",
            ControlPlaneError::Core(e) => e.error_code(),
        }
    }

    /// Text shown to the tenant who triggered the failing operation.
    pub fn user_message(&self) -> String {
        match self {
            ControlPlaneError::QuotaExceeded {
                current,
                limit,
                tier,
            } => format!(
                "❌ Your plan ({tier}) allows max {limit} bots and you have {current}. Remove some or upgrade."
            ),
            ControlPlaneError::MalformedInput(msg) => format!("❌ {msg}"),
            ControlPlaneError::PermissionDenied(_) => {
                "⛔ You are not allowed to do that.".to_string()
            }
            ControlPlaneError::ArchiveError(msg) => format!("❌ Failed to extract ZIP: {msg}"),
            ControlPlaneError::Core(CoreError::ResolutionError(_)) => {
                "❌ No runnable entry point found (expected bot.py, main.py, run.py, package.json, a .py file or start.sh).".to_string()
            }
            ControlPlaneError::Core(CoreError::InstanceNotFound(id)) => {
                format!("❌ Unknown bot {id}.")
            }
            ControlPlaneError::Core(CoreError::LaunchError(reason)) => {
                format!("❌ Failed to start: {reason}. Check logs.")
            }
            other => format!("❌ {other}"),
        }
    }
}

impl From<std::io::Error> for ControlPlaneError {
    fn from(err: std::io::Error) -> Self {
        ControlPlaneError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for ControlPlaneError {
    fn from(err: serde_json::Error) -> Self {
        ControlPlaneError::StorageError(err.to_string())
    }
}

pub type ControlPlaneResult<T> = std::result::Result<T, ControlPlaneError>;
