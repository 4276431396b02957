use crate::cache::{Cache, CacheEntry};
use crate::signature::Signature;
use parking_lot::Mutex;
use quarry_storage::error::{ErrorKind, Result};
use std::any::Any;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, Weak};
use tracing::instrument;

/// Recipe for one piece of derived data.
pub trait Make: Send + Sync + 'static {
    type Output: Any + Send + Sync;

    /// What kind of thing gets made, e.g. `"bounds"`.
    fn kind(&self) -> String;

    /// What it is made from. Together with [`kind`](Self::kind) this forms
    /// the cache signature.
    fn source(&self) -> String;

    /// Whether everything needed to make the value is still around.
    fn is_ready(&self) -> bool {
        true
    }

    /// Resource paths the value is derived from.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn make(&self) -> Result<Self::Output>;
}

/// Lazily made, cached derived data.
///
/// The first [`lock`](Self::lock) looks in the cache and makes the value on a
/// miss; later calls reuse it for as long as anybody holds it.
pub struct Proxy<M: Make> {
    maker: Arc<M>,
    cache: Arc<Cache>,
    reference: Mutex<Weak<M::Output>>,
}

impl<M: Make> Proxy<M> {
    pub fn new(maker: M, cache: Arc<Cache>) -> Self {
        Self { maker: Arc::new(maker), cache, reference: Mutex::new(Weak::new()) }
    }

    pub fn signature(&self) -> Signature {
        Signature::new(self.maker.kind(), self.maker.source())
    }

    pub fn kind(&self) -> String {
        self.maker.kind()
    }

    pub fn source(&self) -> String {
        self.maker.source()
    }

    pub fn is_ready(&self) -> bool {
        self.maker.is_ready()
    }

    #[instrument(level = "trace", skip(self), fields(signature = %self.signature()))]
    pub fn lock(&self) -> Result<Arc<M::Output>> {
        let mut reference = self.reference.lock();
        if let Some(value) = reference.upgrade() {
            return Ok(value);
        }
        let signature = self.signature();
        if let Some(value) = self.cache.fetch::<M::Output>(&signature) {
            *reference = Arc::downgrade(&value);
            return Ok(value);
        }
        if !self.maker.is_ready() {
            exn::bail!(ErrorKind::NotAvailable(format!("inputs for {signature}")));
        }

        let value = Arc::new(self.maker.make()?);
        let maker = self.maker.clone();
        let mut entry =
            CacheEntry::new(self.maker.kind(), value.clone()).with_repair(move || Ok(Arc::new(maker.make()?)));
        for dependency in self.maker.dependencies() {
            entry = entry.depends_on(dependency);
        }
        self.cache.store(signature, entry);
        *reference = Arc::downgrade(&value);
        Ok(value)
    }

    /// Alias of [`lock`](Self::lock).
    pub fn get(&self) -> Result<Arc<M::Output>> {
        self.lock()
    }

    /// Ask the cache to rebuild the value on its next fetch.
    pub fn invalidate(&self) {
        *self.reference.lock() = Weak::new();
        self.cache.invalidate(&self.signature());
    }

    pub fn purge(&self) {
        *self.reference.lock() = Weak::new();
        self.cache.purge_one(&self.signature());
    }
}

impl<M: Make> Debug for Proxy<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Proxy").field("signature", &self.signature()).finish_non_exhaustive()
    }
}
