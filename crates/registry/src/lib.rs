//! Priority-ordered registries.
//!
//! Everything pluggable in the resource pipeline is chosen the same way: a
//! list of records sorted by descending priority is walked until one of them
//! accepts. The generic [`Registry`] covers factories; [`ScannerRegistry`],
//! [`LoaderRegistry`] and [`SaverRegistry`] add MIME type and extension keys
//! on top, and [`TypeRegistry`] holds display names and post-load hooks.
//!
//! Registration happens once, up front, through `&mut` access; the finished
//! [`Registries`] bundle is then shared read-only.

mod dispatch;
mod factory;
mod load;
mod priority;
mod save;
mod scan;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod types;

pub use crate::dispatch::{DispatchTable, Keyed, Step};
pub use crate::factory::{FactoryRecord, Registry};
pub use crate::load::{LoaderRecord, LoaderRegistry};
pub use crate::priority::{PriorityList, Prioritized};
pub use crate::save::{SaverRecord, SaverRegistry};
pub use crate::scan::{PRELOAD_BYTES, ScanFn, ScannerRecord, ScannerRegistry};
pub use crate::types::{Loaded, Resource, TypeKey, TypeRegistry};
pub use quarry_storage::error::{Error, ErrorKind, Result};

/// Every resource registry, populated once and then shared.
#[derive(Debug, Default)]
pub struct Registries {
    pub scanners: ScannerRegistry,
    pub loaders: LoaderRegistry,
    pub savers: SaverRegistry,
    pub types: TypeRegistry,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }
}
