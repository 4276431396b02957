use crate::error::Result;
use crate::pipe::file::{resolve_seek, seek_len};
use crate::stream::{ReadSeek, Stream};
use crate::{Pipe, PipeHandle};
use parking_lot::Mutex;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Pipe that keeps the first `limit` bytes of another pipe in memory.
///
/// Content sniffing asks the same question of the same few bytes over and
/// over (one scanner or loader after another); with the head buffered, those
/// checks stop reopening the backing medium. The head is read once, lazily,
/// on the first [`open`](Pipe::open); the inner pipe is only reopened when a
/// stream reads past it.
#[derive(Debug)]
pub struct PreloadedPipe {
    inner: PipeHandle,
    limit: usize,
    head: Mutex<Option<Arc<[u8]>>>,
}

impl PreloadedPipe {
    pub fn new(inner: PipeHandle, limit: usize) -> Self {
        Self { inner, limit, head: Mutex::new(None) }
    }

    pub fn inner(&self) -> &PipeHandle {
        &self.inner
    }

    fn head(&self) -> Result<Arc<[u8]>> {
        let mut guard = self.head.lock();
        if let Some(head) = guard.as_ref() {
            return Ok(head.clone());
        }
        let mut stream = self.inner.open()?;
        let mut buffer = vec![0; self.limit];
        let n = stream.read_some(&mut buffer)?;
        buffer.truncate(n);
        let head: Arc<[u8]> = buffer.into();
        *guard = Some(head.clone());
        Ok(head)
    }
}

impl Pipe for PreloadedPipe {
    fn origin(&self) -> &Path {
        self.inner.origin()
    }

    fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
        let head = self.head()?;
        // A short head is the whole content.
        let length = (head.len() < self.limit).then_some(head.len() as u64);
        Ok(Box::new(HeadReader { head, inner: self.inner.clone(), stream: None, position: 0, length }))
    }

    fn size(&self) -> Result<u64> {
        let head = self.head()?;
        match head.len() < self.limit {
            true => Ok(head.len() as u64),
            false => self.inner.size(),
        }
    }
}

/// Serves reads from the buffered head, falling through to a lazily opened
/// stream of the inner pipe once the cursor passes the head.
struct HeadReader {
    head: Arc<[u8]>,
    inner: PipeHandle,
    stream: Option<Stream>,
    position: u64,
    length: Option<u64>,
}

impl HeadReader {
    fn stream(&mut self) -> io::Result<&mut Stream> {
        if self.stream.is_none() {
            let stream = self.inner.open().map_err(|e| io::Error::other((*e).clone()))?;
            self.stream = Some(stream);
        }
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(io::Error::other("stream vanished")),
        }
    }
}

impl Read for HeadReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let head_len = self.head.len() as u64;
        if self.position < head_len {
            let start = self.position as usize;
            let n = buf.len().min(self.head.len() - start);
            buf[..n].copy_from_slice(&self.head[start..start + n]);
            self.position += n as u64;
            return Ok(n);
        }
        if self.length.is_some_and(|length| self.position >= length) {
            return Ok(0);
        }
        let position = self.position;
        let stream = self.stream()?;
        if Seek::stream_position(stream)? != position {
            Seek::seek(stream, SeekFrom::Start(position))?;
        }
        let n = Read::read(stream, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for HeadReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if matches!(pos, SeekFrom::End(_)) && self.length.is_none() {
            let length = seek_len(self.stream()?)?;
            self.length = Some(length);
        }
        self.position = resolve_seek(self.position, self.length, pos)?;
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryPipe;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory pipe that counts how often it gets opened.
    #[derive(Debug)]
    struct CountingPipe {
        inner: MemoryPipe,
        opens: AtomicUsize,
    }

    impl Pipe for CountingPipe {
        fn origin(&self) -> &Path {
            self.inner.origin()
        }

        fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open_raw()
        }
    }

    fn counting(data: &[u8]) -> Arc<CountingPipe> {
        Arc::new(CountingPipe { inner: MemoryPipe::new("counted", data.to_vec()), opens: AtomicUsize::new(0) })
    }

    #[test]
    fn test_head_reads_do_not_reopen() {
        let inner = counting(b"0123456789abcdef");
        let pipe = PreloadedPipe::new(inner.clone(), 4);
        for _ in 0..3 {
            let mut stream = pipe.open().unwrap();
            assert!(stream.check_signature(b"0123").unwrap());
        }
        assert_eq!(inner.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reads_past_head() {
        let inner = counting(b"0123456789abcdef");
        let pipe = PreloadedPipe::new(inner.clone(), 4);
        let mut stream = pipe.open().unwrap();
        assert_eq!(stream.get_text().unwrap(), "0123456789abcdef");
        stream.seek(10).unwrap();
        assert_eq!(stream.get_text().unwrap(), "abcdef");
        assert_eq!(stream.size().unwrap(), 16);
    }

    #[test]
    fn test_short_content_never_reopens() {
        let inner = counting(b"tiny");
        let pipe = PreloadedPipe::new(inner.clone(), 1024);
        assert_eq!(pipe.size().unwrap(), 4);
        let mut stream = pipe.open().unwrap();
        assert_eq!(stream.get_text().unwrap(), "tiny");
        assert_eq!(stream.size().unwrap(), 4);
        assert_eq!(inner.opens.load(Ordering::SeqCst), 1);
    }
}
