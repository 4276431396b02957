use crate::Pipe;
use crate::error::{ErrorKind, Result};
use crate::stream::ReadSeek;
use exn::ResultExt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Pipe over a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FilePipe {
    path: PathBuf,
}

impl FilePipe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn map_open_error(&self, err: &io::Error) -> ErrorKind {
        match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::FileNotFound(self.path.clone()),
            // A file that exists but won't open is an access problem,
            // whatever the OS decided to call it.
            _ if self.path.exists() => ErrorKind::FileAccess(self.path.clone()),
            _ => ErrorKind::FileNotFound(self.path.clone()),
        }
    }
}

impl Pipe for FilePipe {
    fn origin(&self) -> &Path {
        &self.path
    }

    fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                let kind = self.map_open_error(&e);
                return Err(e).or_raise(|| kind);
            },
        };
        Ok(Box::new(BufReader::new(file)))
    }

    fn size(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) => {
                let kind = self.map_open_error(&e);
                Err(e).or_raise(|| kind)
            },
        }
    }
}

/// Read `n` bytes and throw them away. Used to emulate forward seeks on
/// readers that can't seek.
pub(crate) fn skip<R: Read + ?Sized>(reader: &mut R, n: u64) -> io::Result<u64> {
    io::copy(&mut reader.take(n), &mut io::sink())
}

/// Resolve a [`SeekFrom`] against a known position and (optional) length.
pub(crate) fn resolve_seek(position: u64, length: Option<u64>, seek: SeekFrom) -> io::Result<u64> {
    let target = match seek {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::Current(delta) => position.checked_add_signed(delta),
        SeekFrom::End(delta) => match length {
            Some(length) => length.checked_add_signed(delta),
            None => return Err(io::Error::new(io::ErrorKind::Unsupported, "stream length unknown")),
        },
    };
    target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative or overflowing position"))
}

/// Anything seekable can report its length by seeking to the end and back.
pub(crate) fn seek_len<S: Seek + ?Sized>(stream: &mut S) -> io::Result<u64> {
    let position = stream.stream_position()?;
    let length = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(position))?;
    Ok(length)
}
