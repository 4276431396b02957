use crate::catalog::Catalog;
use crate::context::SourceContext;
use crate::directory::{exposed_path, file_node};
use crate::source::Source;
use exn::OptionExt;
use parking_lot::Mutex;
use quarry_storage::FileInfo;
use quarry_storage::error::{ErrorKind, Result};
use quarry_storage::path::normalize;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// A single file, mounted under its own file name.
#[derive(Debug)]
pub struct FileSource {
    root: PathBuf,
    name: String,
    catalog: Catalog,
    stamp: Mutex<Option<FileInfo>>,
}

impl FileSource {
    #[instrument(level = "debug", skip(context), fields(root = %root.as_ref().display()))]
    pub fn new(root: impl AsRef<Path>, context: SourceContext) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let name = root
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| normalize(name).ok())
            .ok_or_raise(|| ErrorKind::InvalidPath(root.display().to_string()))?;
        let stamp = FileInfo::stat(&root)?;
        let source = Self { catalog: Catalog::new(context), stamp: Mutex::new(None), root, name };
        source.catalog.index(file_node(&source.root, &source.name));
        *source.stamp.lock() = Some(stamp);
        Ok(source)
    }
}

impl Source for FileSource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[instrument(level = "debug", skip(self), fields(root = %self.root.display()))]
    fn refresh(&self) -> Result<Vec<String>> {
        let current = match FileInfo::stat(&self.root) {
            Ok(info) => Some(info),
            Err(err) if matches!(&*err, ErrorKind::FileNotFound(_)) => None,
            Err(err) => return Err(err),
        };
        let mut stamp = self.stamp.lock();
        if *stamp == current {
            return Ok(Vec::new());
        }
        let cleared = self.catalog.clear(exposed_path(&self.name));
        if current.is_some() {
            self.catalog.index(file_node(&self.root, &self.name));
        }
        *stamp = current;
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_registry::Registries;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn context() -> SourceContext {
        SourceContext::new(Arc::new(Registries::new()))
    }

    #[test]
    fn test_mounted_under_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.txt");
        std::fs::write(&path, "volume=3").unwrap();

        let source = FileSource::new(&path, context()).unwrap();
        assert_eq!(source.paths(), ["settings.txt"]);
        assert_eq!(source.root(), path.as_path());
        assert_eq!(source.open("settings.txt").unwrap().unwrap().get_text().unwrap(), "volume=3");
    }

    #[test]
    fn test_refresh_tracks_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.txt");
        std::fs::write(&path, "volume=3").unwrap();
        let source = FileSource::new(&path, context()).unwrap();
        assert!(source.refresh().unwrap().is_empty());

        std::fs::write(&path, "volume=11, loud").unwrap();
        assert_eq!(source.refresh().unwrap(), ["settings.txt"]);
        assert_eq!(source.open("settings.txt").unwrap().unwrap().get_text().unwrap(), "volume=11, loud");

        std::fs::remove_file(&path).unwrap();
        assert_eq!(source.refresh().unwrap(), ["settings.txt"]);
        assert!(source.paths().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = FileSource::new(dir.path().join("absent.txt"), context()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
    }
}
