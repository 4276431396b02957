//! Eviction policies.
//!
//! The cache keeps a clock made of elapsed seconds and elapsed frames. On
//! every [`Cache::update`](crate::Cache::update) it asks the policy whether
//! each entry has been idle long enough to go. Entries still held outside the
//! cache are never evicted, whatever the policy says.

use std::fmt::Debug;

/// A point on the cache clock, or a distance between two points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheTime {
    pub seconds: f64,
    pub frames: u64,
}

impl CacheTime {
    pub fn new(seconds: f64, frames: u64) -> Self {
        Self { seconds, frames }
    }

    /// Distance from `earlier` to `self`.
    pub fn since(&self, earlier: CacheTime) -> CacheTime {
        CacheTime::new(self.seconds - earlier.seconds, self.frames.saturating_sub(earlier.frames))
    }
}

pub trait EvictionPolicy: Debug + Send + Sync {
    fn expired(&self, idle: CacheTime) -> bool;
}

/// Evicts entries idle for more than `seconds` *and* more than `frames`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdlePolicy {
    pub seconds: f64,
    pub frames: u64,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self { seconds: 4.0, frames: 8 }
    }
}

impl EvictionPolicy for IdlePolicy {
    fn expired(&self, idle: CacheTime) -> bool {
        idle.seconds > self.seconds && idle.frames > self.frames
    }
}

/// Never evicts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainPolicy;

impl EvictionPolicy for RetainPolicy {
    fn expired(&self, _idle: CacheTime) -> bool {
        false
    }
}
