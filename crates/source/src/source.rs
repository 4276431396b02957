use crate::catalog::Catalog;
use quarry_registry::{Resource, TypeKey};
use quarry_storage::Stream;
use quarry_storage::error::Result;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// One mounted backing medium.
///
/// Implementors own a [`Catalog`] and know how to bring it up to date with
/// the medium; lookups and typed loading are shared.
pub trait Source: Debug + Send + Sync {
    /// Where the source is mounted from.
    fn root(&self) -> &Path;

    fn catalog(&self) -> &Catalog;

    /// Re-index whatever changed on the medium since the last refresh.
    /// Returns every path that was cleared along the way.
    fn refresh(&self) -> Result<Vec<String>>;

    fn open(&self, path: &str) -> Result<Option<Stream>> {
        self.catalog().open(path)
    }

    fn load(&self, key: TypeKey, path: &str) -> Result<Option<Resource>> {
        self.catalog().load(key, path)
    }

    fn paths(&self) -> Vec<String> {
        self.catalog().paths()
    }
}

pub type SourceHandle = Arc<dyn Source>;
