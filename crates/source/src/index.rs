//! The merged resource namespace.

use crate::registry::SourceRegistry;
use crate::source::SourceHandle;
use exn::OptionExt;
use parking_lot::RwLock;
use quarry_registry::{Resource, TypeKey};
use quarry_storage::error::{ErrorKind, Result};
use quarry_storage::{Stream, normalize_path};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};
use tracing::instrument;

/// Every mounted source, most recently mounted first.
///
/// Lookups try the sources in order, so a later mount shadows the paths of
/// earlier ones.
pub struct Index {
    registry: SourceRegistry,
    sources: RwLock<Vec<SourceHandle>>,
}

impl Index {
    pub fn new(registry: SourceRegistry) -> Self {
        Self { registry, sources: RwLock::new(Vec::new()) }
    }

    /// Mount `path` in front of every existing source.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn add_source(&self, path: impl AsRef<Path>) -> Result<SourceHandle> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "indexing source");
        let source = self.registry.make(path)?;
        self.sources.write().insert(0, source.clone());
        Ok(source)
    }

    /// Mount each path in order; ones that fail are skipped with a warning.
    pub fn add_sources<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) -> usize {
        let mut mounted = 0;
        for path in paths {
            match self.add_source(path.as_ref()) {
                Ok(_) => mounted += 1,
                Err(err) => tracing::warn!(path = %path.as_ref().display(), error = %*err, "failed to mount source"),
            }
        }
        mounted
    }

    pub fn sources(&self) -> Vec<SourceHandle> {
        self.sources.read().clone()
    }

    pub fn open(&self, path: &str) -> Result<Stream> {
        let path = normalize_path(path)?;
        for source in self.sources() {
            if let Some(stream) = source.open(&path)? {
                return Ok(stream);
            }
        }
        exn::bail!(ErrorKind::not_found("resource not found", path))
    }

    pub fn load<T: Any + Send + Sync>(&self, path: &str) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        self.load_erased(key, path)?
            .downcast::<T>()
            .ok()
            .ok_or_raise(|| ErrorKind::not_found("resource type mismatch", format!("{path} ({key})")))
    }

    /// Load `path` as the type behind `key`, from the first source that has
    /// it. The sources list is snapshotted first, so loaders may go back
    /// through the index.
    #[instrument(level = "debug", skip(self), fields(r#type = %key))]
    pub fn load_erased(&self, key: TypeKey, path: &str) -> Result<Resource> {
        let path = normalize_path(path)?;
        for source in self.sources() {
            match source.load(key, &path) {
                Ok(Some(resource)) => return Ok(resource),
                Ok(None) => {},
                Err(err) if err.is_not_found() => {
                    let root = source.root().display();
                    tracing::debug!(%path, %root, error = %*err, "resource not loadable as {key}");
                    return Err(err);
                },
                Err(err) => {
                    tracing::error!(%path, root = %source.root().display(), error = %*err, "failed to load resource");
                    return Err(err);
                },
            }
        }
        exn::bail!(ErrorKind::not_found("resource not found", path))
    }

    pub fn load_string(&self, path: &str) -> Result<String> {
        self.open(path)?.get_text()
    }

    /// Refresh every source in lookup order, returning every cleared path.
    pub fn refresh(&self) -> Result<Vec<String>> {
        let mut cleared = Vec::new();
        for source in self.sources() {
            cleared.extend(source.refresh()?);
        }
        Ok(cleared)
    }

    /// Union of every indexed path, sorted.
    pub fn paths(&self) -> Vec<String> {
        let paths: BTreeSet<String> = self.sources().iter().flat_map(|source| source.paths()).collect();
        paths.into_iter().collect()
    }
}

impl Debug for Index {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Index").field("registry", &self.registry).field("sources", &*self.sources.read()).finish()
    }
}

/// Late-bound link to the [`Index`].
///
/// Loaders are registered before the index exists; the ones that need to
/// resolve other resources capture a resolver and use it once it's bound.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    index: Arc<OnceLock<Weak<Index>>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the resolver was already bound.
    pub fn bind(&self, index: &Arc<Index>) -> bool {
        self.index.set(Arc::downgrade(index)).is_ok()
    }

    pub fn index(&self) -> Result<Arc<Index>> {
        self.index.get().and_then(Weak::upgrade).ok_or_raise(|| ErrorKind::NotAvailable("resource index".into()))
    }

    pub fn load<T: Any + Send + Sync>(&self, path: &str) -> Result<Arc<T>> {
        self.index()?.load::<T>(path)
    }
}
