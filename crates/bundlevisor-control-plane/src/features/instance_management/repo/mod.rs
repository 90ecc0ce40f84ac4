//! Unpacks uploaded ZIP archives into bundle directories.

use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extract `bytes` into `dest` on a blocking thread. Returns the number of
/// files written. `dest` is removed again if extraction fails.
pub async fn extract_archive(bytes: Vec<u8>, dest: PathBuf) -> ControlPlaneResult<usize> {
    let target = dest.clone();
    let result = tokio::task::spawn_blocking(move || extract_archive_blocking(&bytes, &target))
        .await
        .map_err(|e| ControlPlaneError::ArchiveError(format!("extraction task failed: {e}")))?;

    if result.is_err() {
        if let Err(e) = std::fs::remove_dir_all(&dest) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %dest.display(), error = %e, "Failed to clean up partial bundle");
            }
        }
    }
    result
}

pub fn extract_archive_blocking(bytes: &[u8], dest: &Path) -> ControlPlaneResult<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ControlPlaneError::ArchiveError(e.to_string()))?;
    std::fs::create_dir_all(dest)?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ControlPlaneError::ArchiveError(e.to_string()))?;

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(ControlPlaneError::ArchiveError(format!(
                    "entry escapes the bundle directory: {}",
                    entry.name()
                )))
            }
        };
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let mode = (mode & 0o777) | 0o600;
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
            }
        }

        written += 1;
    }

    debug!(path = %dest.display(), files = written, "Archive extracted");
    Ok(written)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};

    /// Build an in-memory ZIP with the given `(name, content)` entries.
    pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::zip_bytes;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extracts_nested_files() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1_abc");
        let bytes = zip_bytes(&[("main.py", "print('hi')"), ("lib/util.py", "x = 1")]);

        let written = extract_archive(bytes, dest.clone()).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            std::fs::read_to_string(dest.join("main.py")).unwrap(),
            "print('hi')"
        );
        assert!(dest.join("lib").join("util.py").is_file());
    }

    #[tokio::test]
    async fn test_invalid_archive_removes_directory() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1_abc");

        let err = extract_archive(b"definitely not a zip".to_vec(), dest.clone())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ARCHIVE_ERROR");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_traversal_entry_is_rejected() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundles").join("1_abc");
        let bytes = zip_bytes(&[("../../escape.sh", "rm -rf /")]);

        let err = extract_archive(bytes, dest.clone()).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::ArchiveError(_)));
        assert!(!dir.path().join("escape.sh").exists());
        assert!(!dest.exists());
    }
}
