//! Stream adapters
//!
//! Backends implement [`ReadAdapter`] or [`WriteAdapter`] over their transfer
//! primitives; [`ReadStream`] and [`WriteStream`] wrap them with the uniform
//! lifecycle every caller sees:
//!
//! - `close()` releases the underlying resource exactly once and is a no-op
//!   when repeated;
//! - any read or write after close fails with a transfer error;
//! - closing a writer commits, and a commit fault is returned to the caller;
//! - dropping an open stream releases it (a writer is aborted, never
//!   committed) and logs a release failure at `warn`.

use std::io;

use crate::error::{Error, Operation, Result, Target};

/// Chunk size used when a caller asks for zero bytes or reads to the end
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest buffer a single `read_chunk` call allocates
pub const MAX_CHUNK_SIZE: usize = 16 * DEFAULT_CHUNK_SIZE;

/// Backend side of a read stream
#[cfg_attr(test, mockall::automock)]
pub trait ReadAdapter: Send {
    /// Read up to `buf.len()` bytes; `Ok(0)` means end of stream
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release the transfer and its handle
    fn release(&mut self) -> Result<()>;
}

/// Backend side of a write stream
#[cfg_attr(test, mockall::automock)]
pub trait WriteAdapter: Send {
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn flush(&mut self) -> Result<()>;

    /// Make everything written so far durable and release the handle
    fn commit(&mut self) -> Result<()>;

    /// Release the handle without committing
    fn abort(&mut self) -> Result<()>;
}

/// [`ReadAdapter`] over any blocking reader
struct IoReader<R> {
    inner: Option<R>,
    target: Target,
    path: String,
}

impl<R: io::Read + Send> ReadAdapter for IoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(0);
        };
        loop {
            match inner.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.target.io(Operation::Read, &self.path, e)),
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.inner = None;
        Ok(())
    }
}

/// A readable byte stream bound to one backend path
pub struct ReadStream {
    target: Target,
    path: String,
    adapter: Option<Box<dyn ReadAdapter>>,
}

impl ReadStream {
    pub fn new(target: Target, path: impl Into<String>, adapter: impl ReadAdapter + 'static) -> Self {
        let path = path.into();
        tracing::debug!(target = %target, path = %path, "Opened read stream");
        Self {
            target,
            path,
            adapter: Some(Box::new(adapter)),
        }
    }

    /// Wrap a plain blocking reader; release drops it
    pub fn from_reader<R>(target: Target, path: impl Into<String>, reader: R) -> Self
    where
        R: io::Read + Send + 'static,
    {
        let path = path.into();
        let adapter = IoReader {
            inner: Some(reader),
            target: target.clone(),
            path: path.clone(),
        };
        Self::new(target, path, adapter)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.adapter.is_none()
    }

    /// Read at most `max_bytes`; an empty chunk means end of stream
    ///
    /// Requests above [`MAX_CHUNK_SIZE`] return at most that many bytes.
    pub fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let size = if max_bytes == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            max_bytes.min(MAX_CHUNK_SIZE)
        };
        let adapter = self.live(Operation::Read)?;
        let mut buf = vec![0u8; size];
        let n = adapter.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Read everything that is left
    pub fn read_to_end_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read_chunk(DEFAULT_CHUNK_SIZE)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Release the stream; repeated calls are no-ops
    pub fn close(&mut self) -> Result<()> {
        match self.adapter.take() {
            Some(mut adapter) => {
                tracing::debug!(target = %self.target, path = %self.path, "Closing read stream");
                adapter.release()
            }
            None => Ok(()),
        }
    }

    fn live(&mut self, operation: Operation) -> Result<&mut Box<dyn ReadAdapter>> {
        self.adapter
            .as_mut()
            .ok_or_else(|| closed(&self.target, &self.path, operation))
    }
}

impl io::Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let adapter = self.live(Operation::Read).map_err(into_io)?;
        adapter.read(buf).map_err(into_io)
    }
}

impl Drop for ReadStream {
    fn drop(&mut self) {
        if let Some(mut adapter) = self.adapter.take()
            && let Err(e) = adapter.release()
        {
            tracing::warn!(target = %self.target, path = %self.path, error = %e, "Failed to release read stream");
        }
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("target", &self.target)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A writable byte stream bound to one backend path
pub struct WriteStream {
    target: Target,
    path: String,
    adapter: Option<Box<dyn WriteAdapter>>,
    written: u64,
}

impl WriteStream {
    pub fn new(target: Target, path: impl Into<String>, adapter: impl WriteAdapter + 'static) -> Self {
        let path = path.into();
        tracing::debug!(target = %target, path = %path, "Opened write stream");
        Self {
            target,
            path,
            adapter: Some(Box::new(adapter)),
            written: 0,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.adapter.is_none()
    }

    /// Bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Write part of `bytes`, returning how many were accepted
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<usize> {
        let adapter = self.live(Operation::Write)?;
        let n = adapter.write(bytes)?;
        self.written += n as u64;
        Ok(n)
    }

    /// Write all of `bytes`
    pub fn write_all_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let n = self.write_chunk(bytes)?;
            if n == 0 {
                return Err(self
                    .target
                    .transfer(Operation::Write, format!("{} accepted no bytes", self.path)));
            }
            bytes = &bytes[n..];
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.live(Operation::Flush)?.flush()
    }

    /// Commit and release; repeated calls are no-ops
    ///
    /// When the commit fails the transfer is aborted and the commit error is
    /// returned.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut adapter) = self.adapter.take() else {
            return Ok(());
        };
        tracing::debug!(
            target = %self.target,
            path = %self.path,
            bytes = self.written,
            "Committing write stream"
        );
        if let Err(e) = adapter.commit() {
            if let Err(abort_err) = adapter.abort() {
                tracing::warn!(target = %self.target, path = %self.path, error = %abort_err, "Abort after failed commit also failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Release without committing; repeated calls are no-ops
    pub fn abort(&mut self) -> Result<()> {
        match self.adapter.take() {
            Some(mut adapter) => {
                tracing::debug!(target = %self.target, path = %self.path, "Aborting write stream");
                adapter.abort()
            }
            None => Ok(()),
        }
    }

    fn live(&mut self, operation: Operation) -> Result<&mut Box<dyn WriteAdapter>> {
        self.adapter
            .as_mut()
            .ok_or_else(|| closed(&self.target, &self.path, operation))
    }
}

impl io::Write for WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf).map_err(into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        WriteStream::flush(self).map_err(into_io)
    }
}

impl Drop for WriteStream {
    fn drop(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            tracing::warn!(
                target = %self.target,
                path = %self.path,
                "Write stream dropped without close; discarding"
            );
            if let Err(e) = adapter.abort() {
                tracing::warn!(target = %self.target, path = %self.path, error = %e, "Failed to abort write stream");
            }
        }
    }
}

impl std::fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStream")
            .field("target", &self.target)
            .field("path", &self.path)
            .field("written", &self.written)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Either direction, as returned by `Dispatcher::open`
#[derive(Debug)]
pub enum Stream {
    Reader(ReadStream),
    Writer(WriteStream),
}

impl Stream {
    pub fn into_reader(self) -> Option<ReadStream> {
        match self {
            Stream::Reader(r) => Some(r),
            Stream::Writer(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<WriteStream> {
        match self {
            Stream::Writer(w) => Some(w),
            Stream::Reader(_) => None,
        }
    }

    /// Close either direction (a writer commits)
    pub fn close(&mut self) -> Result<()> {
        match self {
            Stream::Reader(r) => r.close(),
            Stream::Writer(w) => w.close(),
        }
    }
}

fn closed(target: &Target, path: &str, operation: Operation) -> Error {
    target.transfer(operation, format!("stream for {path} is closed"))
}

fn into_io(err: Error) -> io::Error {
    let kind = match &err {
        Error::Timeout { .. } => io::ErrorKind::TimedOut,
        Error::NotFound { .. } => io::ErrorKind::NotFound,
        Error::Connection { .. } => io::ErrorKind::ConnectionAborted,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}
