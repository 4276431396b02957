use crate::error::{ErrorKind, Result};
use crate::path::normalize;
use crate::pipe::SubPipe;
use crate::pipe::rewind::{Reopen, Rewindable};
use crate::stream::ReadSeek;
use crate::{Node, Pipe, PipeHandle};
use bzip2::read::BzDecoder;
use exn::ResultExt;
use flate2::read::DeflateDecoder;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;
use zip::{CompressionMethod, ZipArchive};

/// How an archive entry's bytes are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipMethod {
    Stored,
    Deflated,
    Bzip2,
}

impl ZipMethod {
    fn from_archive(method: CompressionMethod) -> Option<Self> {
        match method {
            CompressionMethod::Stored => Some(ZipMethod::Stored),
            CompressionMethod::Deflated => Some(ZipMethod::Deflated),
            CompressionMethod::Bzip2 => Some(ZipMethod::Bzip2),
            _ => None,
        }
    }
}

/// One entry of a zip archive.
///
/// The entry is addressed by its data offset inside a *container pipe*
/// rather than through an open archive handle, so entries stay cheap to
/// clone and a zip stored inside another zip nests naturally. Every stream
/// reopens the container and decodes from the entry's first byte; backward
/// seeks start over.
#[derive(Debug, Clone)]
pub struct ZipPipe {
    container: PipeHandle,
    name: String,
    origin: PathBuf,
    data_start: u64,
    compressed_size: u64,
    size: u64,
    method: ZipMethod,
}

impl ZipPipe {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> ZipMethod {
        self.method
    }
}

impl Pipe for ZipPipe {
    fn origin(&self) -> &Path {
        &self.origin
    }

    #[instrument(level = "trace", skip(self), fields(origin = %self.origin.display()))]
    fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
        if self.method == ZipMethod::Stored {
            let window = SubPipe::new(self.container.clone(), self.data_start, self.size);
            return window.open_raw();
        }
        let container = self.container.clone();
        let (start, compressed, method) = (self.data_start, self.compressed_size, self.method);
        let reopen: Reopen = Box::new(move || {
            let mut stream = container.open().map_err(|e| io::Error::other((*e).clone()))?;
            stream.seek(start).map_err(|e| io::Error::other((*e).clone()))?;
            let raw = BufReader::new(stream.take(compressed));
            Ok(match method {
                ZipMethod::Bzip2 => Box::new(BzDecoder::new(raw)) as Box<dyn Read + Send>,
                _ => Box::new(DeflateDecoder::new(raw)),
            })
        });
        let reader = Rewindable::new(reopen, Some(self.size)).or_raise(|| ErrorKind::FileRead(self.origin.clone()))?;
        Ok(Box::new(reader))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// Enumerate the file entries of a zip archive held in `container`.
///
/// Each entry becomes a [`Node`] whose path is the normalized entry name.
/// Directories and names that would escape the archive root are skipped.
/// Encrypted entries and compression methods other than stored, deflate and
/// bzip2 are a [`Platform`](ErrorKind::Platform) error for the whole archive.
#[instrument(level = "debug", skip(container), fields(origin = %container.origin().display()))]
pub fn zip_entries(container: &PipeHandle) -> Result<Vec<Node>> {
    let stream = container.open()?;
    let mut archive = ZipArchive::new(stream).map_err(|e| ErrorKind::platform("zip", e))?;
    let mut nodes = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| ErrorKind::platform("zip", e))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let path = match entry.enclosed_name().and_then(|p| p.to_str().map(normalize)) {
            Some(Ok(path)) => path,
            _ => {
                tracing::debug!(entry = %name, "skipping zip entry outside the archive root");
                continue;
            },
        };
        if entry.encrypted() {
            return Err(ErrorKind::platform("zip", format!("encrypted entry: {name}")));
        }
        let Some(method) = ZipMethod::from_archive(entry.compression()) else {
            let message = format!("unsupported compression {:?} for entry: {name}", entry.compression());
            return Err(ErrorKind::platform("zip", message));
        };
        let origin = container.origin().join(&path);
        let pipe = ZipPipe {
            container: container.clone(),
            name,
            origin,
            data_start: entry.data_start(),
            compressed_size: entry.compressed_size(),
            size: entry.size(),
            method,
        };
        nodes.push(Node::new(Arc::new(pipe), path));
    }
    Ok(nodes)
}
