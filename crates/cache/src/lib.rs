//! Cache for derived resource data.
//!
//! Resources loaded from sources are cached per source by weak reference.
//! This crate covers the other kind of data: values *computed* from
//! resources (bounding boxes, glyph atlases, converted images) that are
//! worth keeping around for a while after their last user lets go.
//!
//! # Architecture
//! - [`Cache`]: entries keyed by an opaque [`Signature`], aged on a clock of
//!   seconds and frames and evicted by a pluggable [`EvictionPolicy`].
//! - [`Proxy`]: a handle that makes its value through a [`Make`] recipe on
//!   first use and keeps it in the cache.
//!
//! The cache never loads anything from a source by itself.

mod cache;
mod policy;
mod proxy;
mod signature;

pub use crate::cache::{Cache, CacheEntry, CacheStats};
pub use crate::policy::{CacheTime, EvictionPolicy, IdlePolicy, RetainPolicy};
pub use crate::proxy::{Make, Proxy};
pub use crate::signature::Signature;
