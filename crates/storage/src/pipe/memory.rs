use crate::Pipe;
use crate::error::Result;
use crate::stream::ReadSeek;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pipe over bytes already in memory.
///
/// Handy for derived data (something decoded or generated at runtime that
/// should still be addressable as a resource) and for tests.
#[derive(Debug, Clone)]
pub struct MemoryPipe {
    origin: PathBuf,
    data: Arc<[u8]>,
}

impl MemoryPipe {
    pub fn new(origin: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) -> Self {
        Self { origin: origin.into(), data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Pipe for MemoryPipe {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(SharedBytes(self.data.clone()))))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// `Cursor` wants `AsRef<[u8]>`; `Arc<[u8]>` needs a little help.
struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
