use crate::builtins::register_builtins;
use crate::proxy::ResourceProxy;
use quarry_cache::{Cache, IdlePolicy, RetainPolicy};
use quarry_config::Config;
use quarry_registry::Registries;
use quarry_source::{Excludes, Index, Resolver, SourceContext, source_registry};
use quarry_storage::Stream;
use quarry_storage::error::Result;
use std::any::Any;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Everything the resource pipeline needs, built once from configuration.
pub struct ResourceSystem {
    registries: Arc<Registries>,
    index: Arc<Index>,
    resolver: Resolver,
    cache: Arc<Cache>,
}

impl ResourceSystem {
    /// Register the built-in formats, then mount `resource.sources` followed
    /// by `extra_sources`. Sources that fail to mount are skipped with a
    /// warning; a bad exclude pattern is an error.
    #[instrument(level = "debug", skip_all)]
    pub fn new<P: AsRef<Path>>(config: &Config, extra_sources: impl IntoIterator<Item = P>) -> Result<Self> {
        let resolver = Resolver::new();
        let mut registries = Registries::new();
        register_builtins(&mut registries, &resolver);
        let registries = Arc::new(registries);

        let context = SourceContext::new(registries.clone())
            .with_excludes(Excludes::new(&config.resource.excludes)?)
            .with_verbose(config.resource.verbose);
        let index = Arc::new(Index::new(source_registry(&context)));
        resolver.bind(&index);

        let configured = index.add_sources(&config.resource.sources);
        let extra = index.add_sources(extra_sources);
        tracing::debug!(configured, extra, "mounted sources");

        let cache = match config.cache.evict {
            true => Cache::new(IdlePolicy { seconds: config.cache.idle_seconds, frames: config.cache.idle_frames }),
            false => Cache::new(RetainPolicy),
        };
        Ok(Self { registries, index, resolver, cache: Arc::new(cache) })
    }

    pub fn open(&self, path: &str) -> Result<Stream> {
        self.index.open(path)
    }

    pub fn load<T: Any + Send + Sync>(&self, path: &str) -> Result<Arc<T>> {
        self.index.load::<T>(path)
    }

    pub fn load_string(&self, path: &str) -> Result<String> {
        self.index.load_string(path)
    }

    /// Save `value` through the best matching saver, returning the path
    /// actually written.
    pub fn save<T: Any + Send + Sync>(&self, value: &T, path: &Path, format: Option<&str>) -> Result<PathBuf> {
        self.registries.savers.save(&self.registries.types, value, path, format, true)
    }

    /// A lazy reference to `path`, resolved on first use.
    pub fn proxy<T: Any + Send + Sync>(&self, path: impl Into<String>) -> ResourceProxy<T> {
        ResourceProxy::new(path, self.resolver.clone())
    }

    /// Re-scan every source, and drop cached data derived from whatever
    /// changed. Returns the paths that were cleared.
    pub fn refresh(&self) -> Result<Vec<String>> {
        let cleared = self.index.refresh()?;
        let purged: usize = cleared.iter().map(|path| self.cache.purge_resource(path)).sum();
        tracing::debug!(cleared = cleared.len(), purged, "refreshed sources");
        Ok(cleared)
    }

    /// Per-frame housekeeping. Returns how many cache entries were evicted.
    pub fn update(&self, delta: f64) -> usize {
        self.cache.update(delta)
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }
}

impl Debug for ResourceSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ResourceSystem").field("index", &self.index).field("cache", &self.cache).finish_non_exhaustive()
    }
}
