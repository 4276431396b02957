use crate::error::{ErrorKind, Result};
use crate::path::extension;
use crate::pipe::rewind::{Reopen, Rewindable};
use crate::stream::ReadSeek;
use crate::{Pipe, PipeHandle};
use bzip2::read::BzDecoder;
use exn::ResultExt;
use flate2::read::GzDecoder;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// A compression format that can be decoded transparently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl Compression {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Bzip2 => "bzip2",
            Compression::Gzip => "gzip",
        }
    }

    /// Returns the file extension (without the dot) for this format.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Bzip2 => "bz2",
            Compression::Gzip => "gz",
        }
    }

    /// Detect from the extension of a resource path.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        match extension(path).as_str() {
            "bz2" => Some(Compression::Bzip2),
            "gz" => Some(Compression::Gzip),
            _ => None,
        }
    }

    /// Detect from the first bytes of the content.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(Compression::Gzip)
        } else if bytes.starts_with(b"BZh") {
            Some(Compression::Bzip2)
        } else {
            None
        }
    }

    /// Wrap a reader with the matching decoder.
    pub fn wrap_reader<'a, R: Read + Send + 'a>(&self, reader: R) -> Box<dyn Read + Send + 'a> {
        match self {
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
        }
    }
}

/// Pipe that decompresses another pipe on the fly.
///
/// The decoded length isn't known without decoding everything, so
/// [`size`](Pipe::size) is linear in the content size. Streams seek backwards
/// by restarting the decoder.
#[derive(Debug, Clone)]
pub struct CompressedPipe {
    inner: PipeHandle,
    compression: Compression,
    origin: PathBuf,
}

impl CompressedPipe {
    pub fn new(inner: PipeHandle, compression: Compression) -> Self {
        let origin = inner.origin().to_path_buf();
        Self { inner, compression, origin }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl Pipe for CompressedPipe {
    fn origin(&self) -> &Path {
        &self.origin
    }

    #[instrument(level = "trace", skip(self), fields(origin = %self.origin.display(), format = %self.compression))]
    fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
        let inner = self.inner.clone();
        let compression = self.compression;
        let reopen: Reopen = Box::new(move || {
            let stream = inner.open().map_err(|e| io::Error::other((*e).clone()))?;
            Ok(compression.wrap_reader(BufReader::new(stream)))
        });
        let reader = Rewindable::new(reopen, None).or_raise(|| ErrorKind::FileRead(self.origin.clone()))?;
        Ok(Box::new(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryPipe;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use rstest::rstest;
    use std::io::{SeekFrom, Write};
    use std::sync::Arc;

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn bzip2_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[rstest]
    #[case("a/b.txt.gz", Some(Compression::Gzip))]
    #[case("a/b.TXT.BZ2", Some(Compression::Bzip2))]
    #[case("a/b.txt", None)]
    fn test_from_path(#[case] path: &str, #[case] expected: Option<Compression>) {
        assert_eq!(Compression::from_path(path), expected);
    }

    #[test]
    fn test_from_magic_bytes() {
        assert_eq!(Compression::from_magic_bytes(&gzip_bytes(b"x")), Some(Compression::Gzip));
        assert_eq!(Compression::from_magic_bytes(&bzip2_bytes(b"x")), Some(Compression::Bzip2));
        assert_eq!(Compression::from_magic_bytes(b"plain"), None);
    }

    #[rstest]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    fn test_decompress_and_seek(#[case] format: Compression) {
        let original = b"The quick brown fox jumps over the lazy dog";
        let packed = match format {
            Compression::Gzip => gzip_bytes(original),
            Compression::Bzip2 => bzip2_bytes(original),
        };
        let inner: PipeHandle = Arc::new(MemoryPipe::new("fox.txt.gz", packed));
        let pipe = CompressedPipe::new(inner, format);
        assert_eq!(pipe.size().unwrap(), original.len() as u64);

        let mut stream = pipe.open().unwrap();
        stream.seek(16).unwrap();
        let mut buf = [0u8; 3];
        stream.read(&mut buf).unwrap();
        assert_eq!(&buf, b"fox");
        // Backwards: decoder restarts
        stream.seek(4).unwrap();
        stream.read(&mut buf).unwrap();
        assert_eq!(&buf, b"qui");
        stream.seek_from(SeekFrom::End(-3)).unwrap();
        assert_eq!(stream.get_text().unwrap(), "dog");
    }

    #[test]
    fn test_corrupt_data_fails_on_read() {
        let inner: PipeHandle = Arc::new(MemoryPipe::new("broken.gz", b"not gzip at all".to_vec()));
        let pipe = CompressedPipe::new(inner, Compression::Gzip);
        let mut stream = pipe.open().unwrap();
        assert!(stream.read_to_end().is_err());
    }
}
