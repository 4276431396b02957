//! Resource indexing, loading and caching for game assets.
//!
//! Directories, single files and zip archives are mounted into one
//! namespace of canonical `/`-separated paths; later mounts shadow earlier
//! ones. Typed resources are loaded through priority-ordered loader
//! registries and shared by weak reference, and data derived from them is
//! kept in a signature-keyed cache.
//!
//! # Architecture
//! - [`quarry_storage`]: pipes, streams, nodes and the error taxonomy.
//! - [`quarry_registry`]: scanner, loader, saver and type registries.
//! - [`quarry_source`]: directory, file and zip sources, and the [`Index`].
//! - [`quarry_cache`]: the derived-data [`Cache`] and its proxies.
//! - [`quarry_config`]: layered configuration.
//!
//! [`ResourceSystem`] wires these together with the [`builtins`].

pub mod builtins;
mod proxy;
mod system;

pub use crate::builtins::register_builtins;
pub use crate::proxy::ResourceProxy;
pub use crate::system::ResourceSystem;
pub use quarry_cache::{Cache, Make, Proxy, Signature};
pub use quarry_config::{Config, ConfigLoader};
pub use quarry_source::{Index, Resolver};
pub use quarry_storage::error::{Error, ErrorKind, Result};
