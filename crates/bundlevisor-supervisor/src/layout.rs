//! On-disk bundle layout: the durable record of which instances exist.

use bundlevisor_core::{owner_of, OwnerId};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BundleLayout {
    bundles_dir: PathBuf,
}

impl BundleLayout {
    pub fn new(bundles_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundles_dir: bundles_dir.into(),
        }
    }

    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.bundles_dir)
    }

    pub fn root(&self) -> &Path {
        &self.bundles_dir
    }

    pub fn bundle_dir(&self, instance_id: &str) -> PathBuf {
        self.bundles_dir.join(instance_id)
    }

    pub fn exists(&self, instance_id: &str) -> bool {
        is_valid_instance_id(instance_id) && self.bundle_dir(instance_id).is_dir()
    }

    /// All bundle directories, sorted by instance id (discovery order).
    pub fn list(&self) -> io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.bundles_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Bundle directories owned by `owner_id`.
    pub fn owned_by(&self, owner_id: OwnerId) -> io::Result<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|id| owner_of(id) == Some(owner_id))
            .collect())
    }

    pub fn remove(&self, instance_id: &str) -> io::Result<()> {
        let dir = self.bundle_dir(instance_id);
        match std::fs::remove_dir_all(&dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Instance ids double as directory names and must not traverse.
pub fn is_valid_instance_id(instance_id: &str) -> bool {
    !instance_id.is_empty()
        && instance_id != "."
        && instance_id != ".."
        && instance_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_list_is_sorted_and_skips_files() {
        let dir = TempDir::new().unwrap();
        let layout = BundleLayout::new(dir.path());
        fs::create_dir(dir.path().join("2_b")).unwrap();
        fs::create_dir(dir.path().join("1_a")).unwrap();
        fs::write(dir.path().join("stray.txt"), "x").unwrap();

        assert_eq!(layout.list().unwrap(), vec!["1_a", "2_b"]);
    }

    #[test]
    fn test_missing_root_lists_empty() {
        let dir = TempDir::new().unwrap();
        let layout = BundleLayout::new(dir.path().join("absent"));
        assert!(layout.list().unwrap().is_empty());
    }

    #[test]
    fn test_owned_by_compares_owner_numerically() {
        let dir = TempDir::new().unwrap();
        let layout = BundleLayout::new(dir.path());
        for id in ["12_a", "123_b", "12_c", "junk"] {
            fs::create_dir(dir.path().join(id)).unwrap();
        }

        assert_eq!(layout.owned_by(12).unwrap(), vec!["12_a", "12_c"]);
        assert_eq!(layout.owned_by(123).unwrap(), vec!["123_b"]);
    }

    #[test]
    fn test_exists_and_remove() {
        let dir = TempDir::new().unwrap();
        let layout = BundleLayout::new(dir.path());
        fs::create_dir(layout.bundle_dir("5_x")).unwrap();

        assert!(layout.exists("5_x"));
        layout.remove("5_x").unwrap();
        assert!(!layout.exists("5_x"));
        layout.remove("5_x").unwrap();
    }

    #[test]
    fn test_traversal_ids_never_exist() {
        let dir = TempDir::new().unwrap();
        let layout = BundleLayout::new(dir.path().join("bundles"));
        layout.ensure().unwrap();
        assert!(!layout.exists(".."));
        assert!(!layout.exists("../bundles"));
        assert!(!is_valid_instance_id("a/b"));
        assert!(is_valid_instance_id("42_deadbeef"));
    }
}
