//! Mounted resource sources.
//!
//! A [`Source`] is one backing medium (a directory tree, a single file or a
//! zip archive) indexed into a [`Catalog`] of canonical paths. The
//! [`SourceRegistry`] decides which kind of source a path becomes, and the
//! [`Index`] merges every mounted source into one namespace, with later
//! mounts shadowing earlier ones.

mod catalog;
mod context;
mod directory;
mod file;
mod index;
mod registry;
mod source;
mod zip;

pub use crate::catalog::Catalog;
pub use crate::context::{Excludes, SourceContext};
pub use crate::directory::DirectorySource;
pub use crate::file::FileSource;
pub use crate::index::{Index, Resolver};
pub use crate::registry::{SourceRecord, SourceRegistry, source_registry};
pub use crate::source::{Source, SourceHandle};
pub use crate::zip::ZipSource;
