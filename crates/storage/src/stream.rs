//! Read cursors over pipe contents.
//!
//! A [`Stream`] is what a [`Pipe`](crate::Pipe) hands out: an independent
//! cursor that remembers where its bytes come from, so that every failure can
//! name its origin. It wraps any `Read + Seek` and implements both traits
//! itself, so codecs (`png`, `zip`) can consume it directly.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Anything a stream can be built from.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

pub struct Stream {
    origin: PathBuf,
    inner: Box<dyn ReadSeek>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("origin", &self.origin).finish_non_exhaustive()
    }
}

impl Stream {
    pub fn new(origin: impl Into<PathBuf>, inner: Box<dyn ReadSeek>) -> Self {
        Self { origin: origin.into(), inner }
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    fn read_error(&self) -> ErrorKind {
        ErrorKind::FileRead(self.origin.clone())
    }

    /// Fill `buf` completely, failing with
    /// [`EndOfStream`](ErrorKind::EndOfStream) on a short read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = self.read_some(buf)?;
        if n < buf.len() {
            exn::bail!(ErrorKind::EndOfStream(self.origin.clone()));
        }
        Ok(())
    }

    /// Read as much as is available up to `buf.len()`; only hard I/O failures
    /// are errors.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.inner.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).or_raise(|| self.read_error()),
            }
        }
        Ok(total)
    }

    /// Read everything from the cursor to the end.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.inner.read_to_end(&mut buffer).or_raise(|| self.read_error())?;
        Ok(buffer)
    }

    pub fn tell(&mut self) -> Result<u64> {
        self.inner.stream_position().or_raise(|| self.read_error())
    }

    /// Seek to an absolute position.
    pub fn seek(&mut self, position: u64) -> Result<u64> {
        self.seek_from(SeekFrom::Start(position))
    }

    /// Seek relative to the start, the cursor or the end. Seeking past the
    /// end with a positive `End` offset is an
    /// [`EndOfStream`](ErrorKind::EndOfStream).
    pub fn seek_from(&mut self, position: SeekFrom) -> Result<u64> {
        if let SeekFrom::End(offset) = position
            && offset > 0
        {
            exn::bail!(ErrorKind::EndOfStream(self.origin.clone()));
        }
        self.inner.seek(position).or_raise(|| self.read_error())
    }

    /// Total length of the stream; the cursor is left where it was.
    pub fn size(&mut self) -> Result<u64> {
        let position = self.tell()?;
        let size = self.inner.seek(SeekFrom::End(0)).or_raise(|| self.read_error())?;
        self.seek(position)?;
        Ok(size)
    }

    /// Compare the next bytes against `signature`, then rewind to where the
    /// cursor started. A stream shorter than the signature simply doesn't
    /// match.
    pub fn check_signature(&mut self, signature: &[u8]) -> Result<bool> {
        let position = self.tell()?;
        let mut buffer = vec![0; signature.len()];
        let n = self.read_some(&mut buffer)?;
        self.seek(position)?;
        Ok(n == signature.len() && buffer == signature)
    }

    /// Next character with CR and CRLF folded into LF, or `None` at the end.
    ///
    /// Characters are bytes here; use [`get_text`](Self::get_text) for UTF-8.
    pub fn get_char(&mut self) -> Result<Option<char>> {
        let mut byte = [0u8; 1];
        if self.read_some(&mut byte)? == 0 {
            return Ok(None);
        }
        if byte[0] != b'\r' {
            return Ok(Some(byte[0] as char));
        }
        // Swallow the LF of a CRLF pair, otherwise step back.
        let position = self.tell()?;
        if self.read_some(&mut byte)? == 1 && byte[0] != b'\n' {
            self.seek(position)?;
        }
        Ok(Some('\n'))
    }

    /// Next line without its terminator, or `None` at the end.
    pub fn get_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        let mut any = false;
        while let Some(c) = self.get_char()? {
            any = true;
            if c == '\n' {
                break;
            }
            line.push(c as u8);
        }
        if !any {
            return Ok(None);
        }
        let origin = &self.origin;
        String::from_utf8(line).map(Some).or_raise(|| ErrorKind::Format(format!("invalid UTF-8 in {}", origin.display())))
    }

    /// Read the remainder of the stream as UTF-8 text with line endings
    /// normalized to LF.
    pub fn get_text(&mut self) -> Result<String> {
        let bytes = self.read_to_end()?;
        let text = String::from_utf8(bytes)
            .or_raise(|| ErrorKind::Format(format!("invalid UTF-8 in {}", self.origin.display())))?;
        Ok(normalize_line_endings(&text))
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Fold CRLF and lone CR into LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Map an I/O failure from a little-endian primitive read into the taxonomy:
/// running out of bytes is an [`EndOfStream`](ErrorKind::EndOfStream), anything
/// else is a [`FileRead`](ErrorKind::FileRead).
pub fn map_read_error(err: &io::Error, origin: &Path) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => ErrorKind::EndOfStream(origin.to_path_buf()),
        _ => ErrorKind::FileRead(origin.to_path_buf()),
    }
}
