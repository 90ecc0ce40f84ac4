//! Append-only per-instance log files.
//!
//! The child writes its own output here through redirected stdio; the
//! store only creates, locates and reads the files.

use bundlevisor_core::{CoreError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LogStore {
    logs_dir: PathBuf,
}

impl LogStore {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.logs_dir
    }

    pub fn log_path(&self, instance_id: &str) -> PathBuf {
        self.logs_dir.join(format!("{instance_id}.log"))
    }

    /// Open (creating if needed) the instance log in append mode.
    pub fn open_append(&self, instance_id: &str) -> Result<File> {
        std::fs::create_dir_all(&self.logs_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(instance_id))?;
        Ok(file)
    }

    /// Last `n_lines` lines of the log, oldest first.
    pub async fn tail(&self, instance_id: &str, n_lines: usize) -> Result<Vec<String>> {
        let bytes = self.full_log(instance_id).await?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let skip = lines.len().saturating_sub(n_lines);
        Ok(lines[skip..].iter().map(|line| line.to_string()).collect())
    }

    pub async fn full_log(&self, instance_id: &str) -> Result<Vec<u8>> {
        let path = self.existing_log_path(instance_id)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Path of the log file, if it has been created.
    pub fn existing_log_path(&self, instance_id: &str) -> Result<PathBuf> {
        let path = self.log_path(instance_id);
        if path.is_file() {
            Ok(path)
        } else {
            Err(CoreError::InstanceNotFound(instance_id.to_string()))
        }
    }
}
