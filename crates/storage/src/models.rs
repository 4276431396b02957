//! Storage models.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// File metadata used for staleness checks.
///
/// Two stamps are considered equal when both size and modification time
/// match; sources re-index a file whenever its stamp changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Location on the local filesystem
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}

impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    /// Read the stamp of a file on disk.
    pub fn stat(path: &Path) -> Result<Self> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(e).or_raise(|| ErrorKind::FileNotFound(path.to_path_buf()));
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::FileAccess(path.to_path_buf())),
        };
        Self::from_metadata(path, &metadata)
    }

    /// Re-use data already collected while walking a directory.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Result<Self> {
        let modified = metadata.modified().or_raise(|| ErrorKind::FileAccess(path.to_path_buf()))?.into();
        Ok(Self::new(path, metadata.len(), modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stat() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"1234").unwrap();
        let info = FileInfo::stat(&path).unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.path, path);
        assert_eq!(FileInfo::stat(&path).unwrap(), info);

        std::fs::write(&path, b"123456").unwrap();
        assert_ne!(FileInfo::stat(&path).unwrap(), info);
    }

    #[test]
    fn test_stat_missing() {
        let dir = tempdir().unwrap();
        let err = FileInfo::stat(&dir.path().join("gone")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
    }
}
