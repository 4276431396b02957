use crate::catalog::Catalog;
use crate::context::SourceContext;
use crate::source::Source;
use parking_lot::Mutex;
use quarry_storage::error::{ErrorKind, Result};
use quarry_storage::{FileInfo, FilePipe, PipeHandle, zip_entries};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// A zip archive on disk. Each entry is its own group.
#[derive(Debug)]
pub struct ZipSource {
    root: PathBuf,
    container: PipeHandle,
    catalog: Catalog,
    stamp: Mutex<Option<FileInfo>>,
}

impl ZipSource {
    #[instrument(level = "debug", skip(context), fields(root = %root.as_ref().display()))]
    pub fn new(root: impl AsRef<Path>, context: SourceContext) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let stamp = FileInfo::stat(&root)?;
        let source = Self {
            container: Arc::new(FilePipe::new(&root)),
            root,
            catalog: Catalog::new(context),
            stamp: Mutex::new(Some(stamp)),
        };
        source.read_archive()?;
        Ok(source)
    }

    fn read_archive(&self) -> Result<()> {
        let entries = zip_entries(&self.container)?;
        tracing::debug!(entries = entries.len(), "reading archive");
        for node in entries {
            self.catalog.index(node);
        }
        Ok(())
    }

    fn clear_all(&self) -> Vec<String> {
        self.catalog.groups().iter().flat_map(|group| self.catalog.clear(group)).collect()
    }
}

impl Source for ZipSource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Re-reads the whole central directory when the archive changed. A
    /// corrupt archive is an error on every refresh, with the old entries
    /// already cleared.
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
        let cleared = self.clear_all();
        // The stamp only moves once the archive reads, so a corrupt archive
        // keeps failing until it changes again.
        if current.is_some() {
            self.read_archive()?;
        }
        *stamp = current;
        Ok(cleared)
    }
}
