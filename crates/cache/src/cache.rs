use crate::policy::{CacheTime, EvictionPolicy, IdlePolicy};
use crate::signature::Signature;
use parking_lot::Mutex;
use quarry_storage::error::Result;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tracing::instrument;

type Data = Arc<dyn Any + Send + Sync>;
type Repair = Arc<dyn Fn() -> Result<Data> + Send + Sync>;

/// A value to store, plus how to rebuild it and what it was derived from.
pub struct CacheEntry {
    name: String,
    data: Data,
    repair: Option<Repair>,
    dependencies: Vec<String>,
}

impl CacheEntry {
    /// `name` only labels the entry in logs.
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, data: Arc<T>) -> Self {
        Self { name: name.into(), data, repair: None, dependencies: Vec::new() }
    }

    /// Rebuild the value after it has been invalidated, instead of evicting
    /// it.
    #[must_use]
    pub fn with_repair<T: Any + Send + Sync>(
        mut self,
        repair: impl Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Self {
        self.repair = Some(Arc::new(move || Ok(repair()? as Data)));
        self
    }

    /// Evict this entry whenever the resource at `path` is purged.
    #[must_use]
    pub fn depends_on(mut self, path: impl Into<String>) -> Self {
        self.dependencies.push(path.into());
        self
    }
}

struct Datum {
    name: String,
    data: Data,
    repair: Option<Repair>,
    dependencies: Vec<String>,
    accessed: CacheTime,
    dirty: bool,
}

#[derive(Default)]
struct State {
    pool: HashMap<Signature, Datum>,
    now: CacheTime,
    tries: u64,
    misses: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub tries: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Storage for derived data that is expensive to build but can always be
/// built again.
///
/// Entries are addressed by [`Signature`] and never loaded from a source by
/// the cache itself; a miss is for the caller to handle.
pub struct Cache {
    policy: Box<dyn EvictionPolicy>,
    state: Mutex<State>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(IdlePolicy::default())
    }
}

impl Cache {
    pub fn new(policy: impl EvictionPolicy + 'static) -> Self {
        Self { policy: Box::new(policy), state: Mutex::new(State::default()) }
    }

    /// The cached value for `signature`, if there is one of type `T`.
    ///
    /// Dirty entries are repaired first; an entry whose repair fails is
    /// evicted and reported as a miss.
    #[instrument(level = "trace", skip_all, fields(%signature))]
    pub fn fetch<T: Any + Send + Sync>(&self, signature: &Signature) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        state.tries += 1;
        let repair = match state.pool.get(signature).map(|datum| (datum.dirty, datum.repair.clone())) {
            None => return Self::miss(&mut state, signature),
            Some((true, repair)) => repair,
            Some((false, _)) => None,
        };

        if let Some(repair) = repair {
            tracing::debug!(%signature, "repairing cached object");
            // The repair may need the cache itself.
            drop(state);
            let repaired = repair();
            state = self.state.lock();
            match repaired {
                Ok(data) => {
                    if let Some(datum) = state.pool.get_mut(signature) {
                        datum.data = data;
                        datum.dirty = false;
                    }
                },
                Err(err) => {
                    tracing::warn!(%signature, error = %*err, "failed to repair cached object");
                    state.pool.remove(signature);
                    return Self::miss(&mut state, signature);
                },
            }
        }

        let now = state.now;
        let found = state.pool.get_mut(signature).map(|datum| {
            datum.accessed = now;
            (datum.data.clone(), datum.name.clone())
        });
        let Some((data, name)) = found else {
            return Self::miss(&mut state, signature);
        };
        match data.downcast::<T>() {
            Ok(data) => Some(data),
            Err(_) => {
                tracing::debug!(%signature, %name, "cached object has another type");
                Self::miss(&mut state, signature)
            },
        }
    }

    fn miss<T>(state: &mut State, signature: &Signature) -> Option<T> {
        state.misses += 1;
        tracing::debug!(%signature, "cache miss");
        None
    }

    /// Store `entry` under `signature`, replacing what was there.
    pub fn store(&self, signature: Signature, entry: CacheEntry) {
        tracing::debug!(%signature, name = %entry.name, "caching object");
        let mut state = self.state.lock();
        let datum = Datum {
            name: entry.name,
            data: entry.data,
            repair: entry.repair,
            dependencies: entry.dependencies,
            accessed: state.now,
            dirty: false,
        };
        state.pool.insert(signature, datum);
    }

    /// Refresh the access stamp of an entry without fetching it.
    pub fn touch(&self, signature: &Signature) {
        let mut state = self.state.lock();
        let now = state.now;
        if let Some(datum) = state.pool.get_mut(signature) {
            datum.accessed = now;
        }
    }

    /// Mark an entry for repair on its next fetch, or evict it if it can't be
    /// repaired.
    pub fn invalidate(&self, signature: &Signature) {
        tracing::trace!(%signature, "invalidating cached object");
        let mut state = self.state.lock();
        let repairable = state.pool.get(signature).map(|datum| datum.repair.is_some());
        match repairable {
            Some(true) => {
                if let Some(datum) = state.pool.get_mut(signature) {
                    datum.dirty = true;
                }
            },
            Some(false) => {
                state.pool.remove(signature);
            },
            None => {},
        }
    }

    /// Drop everything and restart the clock.
    pub fn purge(&self) {
        tracing::debug!("purging cache");
        let mut state = self.state.lock();
        state.pool.clear();
        state.now = CacheTime::default();
    }

    pub fn purge_one(&self, signature: &Signature) {
        tracing::debug!(%signature, "purging cached object");
        self.state.lock().pool.remove(signature);
    }

    /// Evict every entry derived from the resource at `path`. Returns how
    /// many went.
    pub fn purge_resource(&self, path: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.pool.len();
        state.pool.retain(|signature, datum| {
            let keep = !datum.dependencies.iter().any(|dependency| dependency == path);
            if !keep {
                tracing::debug!(%signature, %path, "purging cached object of resource");
            }
            keep
        });
        before - state.pool.len()
    }

    /// Advance the clock by one frame of `delta` seconds and evict expired
    /// entries nobody else holds. Returns how many went.
    pub fn update(&self, delta: f64) -> usize {
        let mut state = self.state.lock();
        state.now.seconds += delta;
        state.now.frames += 1;
        let now = state.now;
        let before = state.pool.len();
        state.pool.retain(|signature, datum| {
            let expired = self.policy.expired(now.since(datum.accessed)) && Arc::strong_count(&datum.data) == 1;
            if expired {
                tracing::trace!(%signature, "cached object timed out");
            }
            !expired
        });
        before - state.pool.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats { tries: state.tries, misses: state.misses, entries: state.pool.len() }
    }
}

impl Debug for Cache {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Cache").field("policy", &self.policy).field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RetainPolicy;
    use quarry_registry::testing::count_warnings;
    use quarry_storage::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sig(source: &str) -> Signature {
        Signature::new("test", source)
    }

    #[test]
    fn test_store_and_fetch() {
        let cache = Cache::default();
        assert!(cache.fetch::<String>(&sig("a")).is_none());
        cache.store(sig("a"), CacheEntry::new("text", Arc::new(String::from("alpha"))));

        let value = cache.fetch::<String>(&sig("a")).unwrap();
        assert_eq!(*value, "alpha");
        // Wrong type is a miss, not a panic.
        assert!(cache.fetch::<u32>(&sig("a")).is_none());
        assert_eq!(cache.stats(), CacheStats { tries: 3, misses: 2, entries: 1 });
    }

    #[test]
    fn test_invalidate_without_repair_evicts() {
        let cache = Cache::default();
        cache.store(sig("a"), CacheEntry::new("n", Arc::new(1u32)));
        cache.invalidate(&sig("a"));
        assert!(cache.fetch::<u32>(&sig("a")).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_invalidate_with_repair_rebuilds() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let cache = Cache::default();
        let entry = CacheEntry::new("n", Arc::new(0usize))
            .with_repair(move || Ok(Arc::new(counter.fetch_add(1, Ordering::SeqCst) + 1)));
        cache.store(sig("a"), entry);

        assert_eq!(*cache.fetch::<usize>(&sig("a")).unwrap(), 0);
        cache.invalidate(&sig("a"));
        assert_eq!(*cache.fetch::<usize>(&sig("a")).unwrap(), 1);
        assert_eq!(*cache.fetch::<usize>(&sig("a")).unwrap(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_repair_warns_and_evicts() {
        let cache = Cache::default();
        let entry = CacheEntry::new("n", Arc::new(0u8))
            .with_repair(|| -> Result<Arc<u8>> { exn::bail!(ErrorKind::Format("gone".into())) });
        cache.store(sig("a"), entry);
        cache.invalidate(&sig("a"));

        let (fetched, warnings) = count_warnings(|| cache.fetch::<u8>(&sig("a")));
        assert!(fetched.is_none());
        assert_eq!(warnings, 1);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_update_evicts_only_idle_and_unheld() {
        let cache = Cache::new(IdlePolicy { seconds: 1.0, frames: 2 });
        let held = Arc::new(String::from("held"));
        cache.store(sig("held"), CacheEntry::new("s", held.clone()));
        cache.store(sig("idle"), CacheEntry::new("s", Arc::new(String::from("idle"))));

        // Enough time but not enough frames.
        assert_eq!(cache.update(10.0), 0);
        assert_eq!(cache.update(0.0), 0);
        assert_eq!(cache.update(0.0), 1);
        assert!(cache.fetch::<String>(&sig("idle")).is_none());
        assert_eq!(*cache.fetch::<String>(&sig("held")).unwrap(), "held");

        drop(held);
        for _ in 0..3 {
            cache.update(1.0);
        }
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_fetch_touches_entry() {
        let cache = Cache::new(IdlePolicy { seconds: 0.5, frames: 1 });
        cache.store(sig("a"), CacheEntry::new("n", Arc::new(1u8)));
        cache.update(1.0);
        cache.fetch::<u8>(&sig("a"));
        assert_eq!(cache.update(1.0), 0);
        assert_eq!(cache.update(1.0), 1);
    }

    #[test]
    fn test_retain_policy_never_evicts() {
        let cache = Cache::new(RetainPolicy);
        cache.store(sig("a"), CacheEntry::new("n", Arc::new(1u8)));
        for _ in 0..100 {
            cache.update(1.0);
        }
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_purge_resource() {
        let cache = Cache::default();
        cache.store(sig("a"), CacheEntry::new("n", Arc::new(1u8)).depends_on("models/tree.mesh"));
        cache.store(sig("b"), CacheEntry::new("n", Arc::new(2u8)).depends_on("models/rock.mesh"));
        cache.store(sig("c"), CacheEntry::new("n", Arc::new(3u8)));

        assert_eq!(cache.purge_resource("models/tree.mesh"), 1);
        assert!(cache.fetch::<u8>(&sig("a")).is_none());
        assert_eq!(*cache.fetch::<u8>(&sig("b")).unwrap(), 2);

        cache.purge_one(&sig("b"));
        assert_eq!(cache.stats().entries, 1);
        cache.purge();
        assert_eq!(cache.stats().entries, 0);
    }
}
