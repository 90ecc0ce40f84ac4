use crate::shared::error::ControlPlaneResult;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Resume cursor for the inbound event stream: the next sequence number
/// still to be processed.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable cursors resume from the start.
    pub async fn load(&self) -> u64 {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(path = %self.path.display(), "Unreadable cursor, resuming from 0");
                0
            }),
            Err(_) => 0,
        }
    }

    pub async fn save(&self, next_sequence: u64) -> ControlPlaneResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, next_sequence.to_string()).await?;
        Ok(())
    }
}
