//! Snapshot file naming, atomic writes and stale-version cleanup.
//!
//! Versioned snapshots live at `{base}/vector-{key}-{version}.bin`;
//! the transactional (index-only) snapshot at `{base}/vector-{key}.bin`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Snapshot files belonging to one database key.
#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    base: PathBuf,
    key: String,
}

impl SnapshotFiles {
    pub fn new(base: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            key: key.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of a versioned snapshot.
    pub fn versioned_path(&self, version: u64) -> PathBuf {
        self.base.join(format!("vector-{}-{}.bin", self.key, version))
    }

    /// Path of the transactional snapshot.
    pub fn transactional_path(&self) -> PathBuf {
        self.base.join(format!("vector-{}.bin", self.key))
    }

    /// Read a snapshot file; a missing file is `Ok(None)`.
    pub fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write bytes to a uniquely named temp file in the base folder, fsync,
    /// then rename over `path` so a crash never leaves a half-written
    /// snapshot in place.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base)?;

        let mut file = NamedTempFile::new_in(&self.base)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| StoreError::Io(e.error))?;

        info!(path = ?path, bytes = bytes.len(), "Wrote snapshot");
        Ok(())
    }

    /// Versions of every versioned snapshot on disk for this key, ascending.
    pub fn versions(&self) -> Result<Vec<u64>, StoreError> {
        let pattern = self.version_pattern()?;
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(version) = pattern
                .captures(name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Newest versioned snapshot on disk.
    pub fn latest_version(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.versions()?.last().copied())
    }

    /// Delete every versioned snapshot except `keep`.
    ///
    /// Failures are logged and skipped; returns how many files were removed.
    pub fn remove_stale(&self, keep: u64) -> usize {
        let versions = match self.versions() {
            Ok(versions) => versions,
            Err(e) => {
                warn!(error = %e, base = ?self.base, "Failed to scan for stale snapshots");
                return 0;
            }
        };

        let mut removed = 0;
        for version in versions.into_iter().filter(|v| *v != keep) {
            let path = self.versioned_path(version);
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = ?path, "Removed stale snapshot");
                    removed += 1;
                }
                Err(e) => warn!(error = %e, path = ?path, "Failed to remove stale snapshot"),
            }
        }
        removed
    }

    fn version_pattern(&self) -> Result<Regex, StoreError> {
        Regex::new(&format!(r"^vector-{}-(\d+)\.bin$", regex::escape(&self.key)))
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let files = SnapshotFiles::new("/data", "db1");
        assert_eq!(files.versioned_path(3), PathBuf::from("/data/vector-db1-3.bin"));
        assert_eq!(files.transactional_path(), PathBuf::from("/data/vector-db1.bin"));
    }

    #[test]
    fn test_read_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let files = SnapshotFiles::new(temp.path(), "db");
        assert!(files.read(&files.versioned_path(1)).unwrap().is_none());
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let temp = TempDir::new().unwrap();
        let files = SnapshotFiles::new(temp.path().join("nested"), "db");
        let path = files.versioned_path(1);

        files.write_atomic(&path, b"first").unwrap();
        files.write_atomic(&path, b"second").unwrap();

        assert_eq!(files.read(&path).unwrap().unwrap(), b"second");
        assert_eq!(fs::read_dir(files.base()).unwrap().count(), 1);
    }

    #[test]
    fn test_versions_only_match_own_key() {
        let temp = TempDir::new().unwrap();
        let files = SnapshotFiles::new(temp.path(), "db");
        for name in [
            "vector-db-1.bin",
            "vector-db-10.bin",
            "vector-db-2.bin",
            "vector-db.bin",
            "vector-db-x-3.bin",
            "vector-dbz-4.bin",
            "vector-db-5.bin.tmp",
            "other.bin",
        ] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }

        assert_eq!(files.versions().unwrap(), vec![1, 2, 10]);
        assert_eq!(files.latest_version().unwrap(), Some(10));
    }

    #[test]
    fn test_versions_escape_key() {
        let temp = TempDir::new().unwrap();
        let files = SnapshotFiles::new(temp.path(), "a.b");
        fs::write(temp.path().join("vector-aXb-1.bin"), b"x").unwrap();
        fs::write(temp.path().join("vector-a.b-2.bin"), b"x").unwrap();
        assert_eq!(files.versions().unwrap(), vec![2]);
    }

    #[test]
    fn test_versions_missing_dir() {
        let temp = TempDir::new().unwrap();
        let files = SnapshotFiles::new(temp.path().join("absent"), "db");
        assert!(files.versions().unwrap().is_empty());
        assert_eq!(files.latest_version().unwrap(), None);
    }

    #[test]
    fn test_remove_stale_keeps_current() {
        let temp = TempDir::new().unwrap();
        let files = SnapshotFiles::new(temp.path(), "db");
        for version in [1, 2, 3] {
            files
                .write_atomic(&files.versioned_path(version), b"x")
                .unwrap();
        }
        fs::write(files.transactional_path(), b"legacy").unwrap();

        assert_eq!(files.remove_stale(2), 2);
        assert_eq!(files.versions().unwrap(), vec![2]);
        assert!(files.transactional_path().exists());
    }

    #[test]
    fn test_remove_stale_skips_undeletable_entries() {
        let temp = TempDir::new().unwrap();
        let files = SnapshotFiles::new(temp.path(), "db");
        fs::create_dir(files.versioned_path(1)).unwrap();
        files.write_atomic(&files.versioned_path(2), b"x").unwrap();
        files.write_atomic(&files.versioned_path(3), b"x").unwrap();

        assert_eq!(files.remove_stale(3), 1);
        assert!(files.versioned_path(1).is_dir());
        assert!(!files.versioned_path(2).exists());
        assert!(files.versioned_path(3).exists());
    }
}
