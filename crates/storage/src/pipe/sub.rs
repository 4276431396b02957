use crate::error::{ErrorKind, Result};
use crate::pipe::file::resolve_seek;
use crate::stream::ReadSeek;
use crate::{Pipe, PipeHandle};
use exn::OptionExt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A windowed view of `size` bytes starting at `offset` within another pipe.
#[derive(Debug, Clone)]
pub struct SubPipe {
    parent: PipeHandle,
    offset: u64,
    size: u64,
    origin: PathBuf,
}

impl SubPipe {
    pub fn new(parent: PipeHandle, offset: u64, size: u64) -> Self {
        let origin = PathBuf::from(format!("{}@{offset}+{size}", parent.origin().display()));
        Self { parent, offset, size, origin }
    }
}

impl Pipe for SubPipe {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
        let mut inner = self.parent.open()?;
        inner.seek(self.offset)?;
        let window = Window { inner, offset: self.offset, size: self.size, position: 0 };
        Ok(Box::new(window))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

struct Window<S> {
    inner: S,
    offset: u64,
    size: u64,
    position: u64,
}

impl<S: Read> Read for Window<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.position);
        let limit = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if limit == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..limit])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: Seek> Seek for Window<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = resolve_seek(self.position, Some(self.size), pos)?;
        self.inner.seek(SeekFrom::Start(self.offset + target))?;
        self.position = target;
        Ok(target)
    }
}

/// Carve a [`SubPipe`] out of a parent, checking the window fits.
pub fn sub_pipe(parent: PipeHandle, offset: u64, size: u64) -> Result<SubPipe> {
    let total = parent.size()?;
    let end = offset.checked_add(size).ok_or_raise(|| ErrorKind::Format("sub-range overflows".to_string()))?;
    if end > total {
        exn::bail!(ErrorKind::EndOfStream(parent.origin().to_path_buf()));
    }
    Ok(SubPipe::new(parent, offset, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryPipe;
    use std::sync::Arc;

    #[test]
    fn test_window() {
        let parent: PipeHandle = Arc::new(MemoryPipe::new("blob", b"0123456789".to_vec()));
        let pipe = sub_pipe(parent, 2, 5).unwrap();
        assert_eq!(pipe.size().unwrap(), 5);
        let mut stream = pipe.open().unwrap();
        assert_eq!(stream.get_text().unwrap(), "23456");
        stream.seek_from(SeekFrom::End(-2)).unwrap();
        assert_eq!(stream.get_text().unwrap(), "56");
        assert_eq!(stream.size().unwrap(), 5);
    }

    #[test]
    fn test_window_out_of_range() {
        let parent: PipeHandle = Arc::new(MemoryPipe::new("blob", b"0123".to_vec()));
        let err = sub_pipe(parent, 2, 5).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EndOfStream(_)));
    }
}
