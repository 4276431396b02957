use crate::pipe::file::{resolve_seek, skip};
use std::io::{self, Read, Seek, SeekFrom};

pub(crate) type Reopen = Box<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send>;

/// Seekable adapter over a forward-only reader (a decompressor).
///
/// Forward seeks read and discard. Backward seeks reopen the source from
/// offset zero and skip forward again, which is expensive for large entries
/// but keeps memory flat. When the decoded length isn't known up front, the
/// first `End`-relative seek counts it by reading to the end.
pub(crate) struct Rewindable {
    reopen: Reopen,
    reader: Box<dyn Read + Send>,
    position: u64,
    length: Option<u64>,
}

impl Rewindable {
    pub(crate) fn new(reopen: Reopen, length: Option<u64>) -> io::Result<Self> {
        let reader = reopen()?;
        Ok(Self { reopen, reader, position: 0, length })
    }

    fn rewind_source(&mut self) -> io::Result<()> {
        self.reader = (self.reopen)()?;
        self.position = 0;
        Ok(())
    }

    fn length(&mut self) -> io::Result<u64> {
        if let Some(length) = self.length {
            return Ok(length);
        }
        let remaining = skip(&mut self.reader, u64::MAX)?;
        self.position += remaining;
        self.length = Some(self.position);
        Ok(self.position)
    }
}

impl Read for Rewindable {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for Rewindable {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let length = match pos {
            SeekFrom::End(_) => Some(self.length()?),
            _ => self.length,
        };
        let target = resolve_seek(self.position, length, pos)?;
        if target < self.position {
            self.rewind_source()?;
        }
        let skipped = skip(&mut self.reader, target - self.position)?;
        self.position += skipped;
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}
