use parking_lot::Mutex;
use quarry_source::Resolver;
use quarry_storage::error::Result;
use std::any::Any;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// A typed reference to a resource by path, resolved through the index on
/// first use.
///
/// Once resolved the proxy keeps the resource alive until [`reset`](Self::reset),
/// sharing ownership with every other holder. Resolution is serialized, so
/// concurrent callers of [`lock`](Self::lock) get the same value.
pub struct ResourceProxy<T> {
    path: String,
    resolver: Resolver,
    resolved: Mutex<Option<Arc<T>>>,
}

impl<T: Any + Send + Sync> ResourceProxy<T> {
    pub fn new(path: impl Into<String>, resolver: Resolver) -> Self {
        Self { path: path.into(), resolver, resolved: Mutex::new(None) }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.lock().is_some()
    }

    /// The resource, loading it if this proxy hasn't yet. A failed load
    /// leaves the proxy unresolved.
    pub fn lock(&self) -> Result<Arc<T>> {
        let mut resolved = self.resolved.lock();
        if let Some(value) = resolved.as_ref() {
            return Ok(value.clone());
        }
        let value = self.resolver.load::<T>(&self.path)?;
        *resolved = Some(value.clone());
        Ok(value)
    }

    /// Alias of [`lock`](Self::lock).
    pub fn get(&self) -> Result<Arc<T>> {
        self.lock()
    }

    /// Let go of the resolved value; the next [`lock`](Self::lock) resolves
    /// again.
    pub fn reset(&self) {
        *self.resolved.lock() = None;
    }
}

impl<T> Clone for ResourceProxy<T> {
    fn clone(&self) -> Self {
        let resolved = Mutex::new(self.resolved.lock().clone());
        Self { path: self.path.clone(), resolver: self.resolver.clone(), resolved }
    }
}

impl<T> PartialEq for ResourceProxy<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<T> Debug for ResourceProxy<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ResourceProxy")
            .field("path", &self.path)
            .field("resolved", &self.resolved.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Text;
    use quarry_registry::{LoaderRecord, Registries};
    use quarry_source::{Index, SourceContext, source_registry};
    use quarry_storage::PipeHandle;
    use quarry_storage::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn index(root: &std::path::Path, loads: Arc<AtomicUsize>) -> Arc<Index> {
        let mut registries = Registries::new();
        registries.types.register::<Text>("text");
        registries.loaders.register(
            LoaderRecord::new("text", move |pipe: &PipeHandle| {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Text(pipe.open()?.get_text()?)))
            })
            .extensions(["txt"]),
        );
        let index = Arc::new(Index::new(source_registry(&SourceContext::new(Arc::new(registries)))));
        index.add_source(root).unwrap();
        index
    }

    #[test]
    fn test_lock_resolves_once() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("motd.txt"), "hello").unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let index = index(dir.path(), loads.clone());
        let resolver = Resolver::new();
        resolver.bind(&index);

        let proxy = ResourceProxy::<Text>::new("motd.txt", resolver);
        assert!(!proxy.is_resolved());
        let a = proxy.lock().unwrap();
        let b = proxy.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(proxy.is_resolved());
        assert_eq!(a.0, "hello");

        // The proxy keeps the value alive on its own.
        drop((a, b));
        proxy.lock().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        proxy.reset();
        assert!(!proxy.is_resolved());
        proxy.lock().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_resource_stays_unresolved() {
        let dir = tempdir().unwrap();
        let index = index(dir.path(), Arc::default());
        let resolver = Resolver::new();
        resolver.bind(&index);

        let proxy = ResourceProxy::<Text>::new("absent.txt", resolver);
        let err = proxy.lock().unwrap_err();
        assert!(err.is_not_found());
        assert!(!proxy.is_resolved());
    }

    #[test]
    fn test_unbound_resolver() {
        let proxy = ResourceProxy::<Text>::new("motd.txt", Resolver::new());
        let err = proxy.lock().unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotAvailable(_)));
    }
}
