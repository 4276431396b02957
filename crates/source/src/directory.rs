use crate::catalog::Catalog;
use crate::context::SourceContext;
use crate::source::Source;
use exn::ResultExt;
use parking_lot::Mutex;
use quarry_storage::error::{ErrorKind, Result};
use quarry_storage::path::{normalize, without_extension};
use quarry_storage::{CompressedPipe, Compression, FileInfo, FilePipe, Node, PipeHandle};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, DirEntry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

enum WalkEntry {
    File(String, FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Node for a file on disk, exposed under `path`. Gzip and bzip2 files are
/// decompressed transparently and lose their compression suffix.
pub(crate) fn file_node(file: &Path, path: &str) -> Node {
    let pipe: PipeHandle = Arc::new(FilePipe::new(file));
    match Compression::from_path(path) {
        Some(compression) => {
            let exposed = without_extension(path).to_string();
            Node::new(Arc::new(CompressedPipe::new(pipe, compression)), exposed)
        },
        None => Node::new(pipe, path),
    }
}

/// Group key of a file: the path it is exposed under.
pub(crate) fn exposed_path(path: &str) -> &str {
    match Compression::from_path(path) {
        Some(_) => without_extension(path),
        None => path,
    }
}

/// A directory tree on the local filesystem. Every file is its own group.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    catalog: Catalog,
    stamps: Mutex<BTreeMap<String, FileInfo>>,
}

impl DirectorySource {
    #[instrument(level = "debug", skip(context), fields(root = %root.as_ref().display()))]
    pub fn new(root: impl AsRef<Path>, context: SourceContext) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            exn::bail!(ErrorKind::FileNotFound(root));
        }
        let source = Self { root, catalog: Catalog::new(context), stamps: Mutex::new(BTreeMap::new()) };
        let files = source.walk()?;
        for (path, info) in &files {
            source.catalog.index(file_node(&info.path, path));
        }
        tracing::debug!(files = files.len(), "indexed directory");
        *source.stamps.lock() = files;
        Ok(source)
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?.to_str()?;
        normalize(relative).ok()
    }

    fn process_entry(&self, entry: &DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        // Follows symlinks; one that points nowhere is dropped.
        let Ok(metadata) = fs::metadata(&path) else {
            return Ok(WalkEntry::Skip);
        };
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !metadata.is_file() {
            return Ok(WalkEntry::Skip);
        }
        let Some(relative) = self.relative_path(&path) else {
            tracing::debug!(path = %path.display(), "skipping file without a canonical path");
            return Ok(WalkEntry::Skip);
        };
        Ok(WalkEntry::File(relative, FileInfo::from_metadata(&path, &metadata)?))
    }

    /// Stamp every file under the root, keyed by relative path.
    fn walk(&self) -> Result<BTreeMap<String, FileInfo>> {
        let mut files = BTreeMap::new();
        let mut stack = vec![self.root.clone()];
        while let Some(current) = stack.pop() {
            let entries = match fs::read_dir(&current) {
                Ok(entries) => entries,
                Err(e) if current == self.root => return Err(e).or_raise(|| ErrorKind::FileAccess(current)),
                Err(e) => {
                    tracing::warn!(path = %current.display(), error = %e, "failed to read directory");
                    continue;
                },
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(path = %current.display(), error = %e, "failed to read directory entry");
                        continue;
                    },
                };
                match self.process_entry(&entry) {
                    Ok(WalkEntry::File(path, info)) => {
                        files.insert(path, info);
                    },
                    Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                    Ok(WalkEntry::Skip) => {},
                    Err(err) => tracing::warn!(path = %entry.path().display(), error = %*err, "failed to stat file"),
                }
            }
        }
        Ok(files)
    }
}

impl Source for DirectorySource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[instrument(level = "debug", skip(self), fields(root = %self.root.display()))]
    fn refresh(&self) -> Result<Vec<String>> {
        let current = self.walk()?;
        let mut stamps = self.stamps.lock();
        // A plain file and its compressed twin share a group, so a change to
        // either re-indexes both.
        let removed = stamps.iter().filter(|(path, stamp)| current.get(*path) != Some(*stamp));
        let added = current.iter().filter(|(path, info)| stamps.get(*path) != Some(*info));
        let stale: BTreeSet<String> = removed.chain(added).map(|(path, _)| exposed_path(path).to_string()).collect();

        let mut cleared = Vec::new();
        for group in &stale {
            cleared.extend(self.catalog.clear(group));
        }
        for (path, info) in &current {
            if stale.contains(exposed_path(path)) {
                self.catalog.index(file_node(&info.path, path));
            }
        }
        *stamps = current;
        Ok(cleared)
    }
}
