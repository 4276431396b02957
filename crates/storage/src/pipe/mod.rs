//! Pipe trait and implementations.
//!
//! A [`Pipe`] is a reusable capability to open fresh, independent read
//! [`Stream`]s over one backing byte source. Pipes are immutable once
//! constructed and are shared (through [`PipeHandle`]) by every node that
//! refers to the same bytes. Stream creation is lazy: building a pipe never
//! touches the backing medium.

mod compressed;
mod file;
mod memory;
mod preload;
mod rewind;
mod sub;
mod zip;

pub use self::compressed::{CompressedPipe, Compression};
pub use self::file::FilePipe;
pub use self::memory::MemoryPipe;
pub use self::preload::PreloadedPipe;
pub use self::sub::{SubPipe, sub_pipe};
pub use self::zip::{ZipMethod, ZipPipe, zip_entries};
use crate::error::Result;
use crate::stream::{ReadSeek, Stream};
use std::fmt::Debug;
use std::path::Path;

/// Unified interface for byte sources.
///
/// Implementors only provide [`origin`](Self::origin) and
/// [`open_raw`](Self::open_raw); the typed [`open`](Self::open) and
/// [`size`](Self::size) are derived from those.
pub trait Pipe: Debug + Send + Sync {
    /// Where the bytes come from, used to label errors and logs. For archive
    /// entries this is `archive/entry`.
    fn origin(&self) -> &Path;

    /// Open a fresh cursor at offset zero.
    ///
    /// Fails with [`FileNotFound`](crate::error::ErrorKind::FileNotFound) or
    /// [`FileAccess`](crate::error::ErrorKind::FileAccess) if the backing
    /// medium has gone away.
    fn open_raw(&self) -> Result<Box<dyn ReadSeek>>;

    /// Open a fresh [`Stream`].
    fn open(&self) -> Result<Stream> {
        Ok(Stream::new(self.origin(), self.open_raw()?))
    }

    /// Total number of bytes a stream from this pipe yields.
    fn size(&self) -> Result<u64> {
        self.open()?.size()
    }
}
