//! Purpose: Boundary contracts between the toolkit and its collaborators.
//! Exports: `ChunkSource`, `ChunkSink`, `ReaderSource`, `WriterSink`, `DigestSink`, `NullSink`, `VecSink`.
//! Role: Everything upstream of the toolkit is "a source of byte chunks with
//! an explicit end"; everything downstream is "a sink that can be completed".
//! Invariants: `read_chunk` returning 0 means end-of-data, never temporary emptiness.
//! Invariants: `complete` is idempotent; `total_written` is known only afterwards.

use std::fmt::Write as _;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha512};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cancel::CancelToken;
use crate::error::{Error, ErrorKind};

/// A forward-only producer of byte chunks.
#[async_trait]
pub trait ChunkSource: Send {
    /// Fill `buf` with the next run of bytes. 0 signals end-of-data.
    async fn read_chunk(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<usize, Error>;

    /// Total size when known up front.
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

/// A consumer of byte chunks with an explicit end-of-data signal.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: Bytes, cancel: &CancelToken) -> Result<(), Error>;

    /// Signal that no more chunks will arrive. Idempotent.
    async fn complete(&mut self) -> Result<(), Error>;

    /// Total bytes accepted, known only once completed.
    fn total_written(&self) -> Option<u64>;
}

/// Adapts any tokio `AsyncRead` (an upload body, a socket, `&[u8]`) into a
/// `ChunkSource`.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    size_hint: Option<u64>,
}

impl<R> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            size_hint: None,
        }
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for ReaderSource<R> {
    async fn read_chunk(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        cancel.check()?;
        tokio::select! {
            result = self.reader.read(buf) => result.map_err(Error::from),
            _ = cancel.canceled() => {
                Err(Error::new(ErrorKind::Canceled).with_message("source read canceled"))
            }
        }
    }

    fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }
}

/// Adapts any tokio `AsyncWrite` (a store upload, a file) into a `ChunkSink`.
/// `complete` shuts the writer down.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    written: u64,
    completed: bool,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            completed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkSink for WriterSink<W> {
    async fn write_chunk(&mut self, chunk: Bytes, cancel: &CancelToken) -> Result<(), Error> {
        cancel.check()?;
        if self.completed {
            return Err(Error::new(ErrorKind::Usage).with_message("write after complete"));
        }
        tokio::select! {
            result = self.writer.write_all(&chunk) => result.map_err(Error::from)?,
            _ = cancel.canceled() => {
                return Err(Error::new(ErrorKind::Canceled).with_message("sink write canceled"));
            }
        }
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), Error> {
        if !self.completed {
            self.writer.shutdown().await.map_err(Error::from)?;
            self.completed = true;
        }
        Ok(())
    }

    fn total_written(&self) -> Option<u64> {
        if self.completed { Some(self.written) } else { None }
    }
}

/// Accumulates a SHA-512 over everything written; the hex digest becomes
/// available once the sink is completed.
#[derive(Debug, Default)]
pub struct DigestSink {
    hasher: Sha512,
    written: u64,
    digest: Option<String>,
}

impl DigestSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowercase hex digest, present only after `complete`.
    pub fn hex_digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

#[async_trait]
impl ChunkSink for DigestSink {
    async fn write_chunk(&mut self, chunk: Bytes, cancel: &CancelToken) -> Result<(), Error> {
        cancel.check()?;
        if self.digest.is_some() {
            return Err(Error::new(ErrorKind::Usage).with_message("write after complete"));
        }
        self.hasher.update(&chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), Error> {
        if self.digest.is_none() {
            let raw = std::mem::take(&mut self.hasher).finalize();
            let mut hex = String::with_capacity(raw.len() * 2);
            for byte in raw {
                let _ = write!(hex, "{byte:02x}");
            }
            self.digest = Some(hex);
        }
        Ok(())
    }

    fn total_written(&self) -> Option<u64> {
        if self.digest.is_some() {
            Some(self.written)
        } else {
            None
        }
    }
}

/// Counts and discards.
#[derive(Debug, Default)]
pub struct NullSink {
    written: u64,
    completed: bool,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkSink for NullSink {
    async fn write_chunk(&mut self, chunk: Bytes, cancel: &CancelToken) -> Result<(), Error> {
        cancel.check()?;
        if self.completed {
            return Err(Error::new(ErrorKind::Usage).with_message("write after complete"));
        }
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), Error> {
        self.completed = true;
        Ok(())
    }

    fn total_written(&self) -> Option<u64> {
        if self.completed { Some(self.written) } else { None }
    }
}

/// Accumulates into memory. Meant for tests and small payloads.
#[derive(Debug, Default)]
pub struct VecSink {
    data: Vec<u8>,
    completed: bool,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[async_trait]
impl ChunkSink for VecSink {
    async fn write_chunk(&mut self, chunk: Bytes, cancel: &CancelToken) -> Result<(), Error> {
        cancel.check()?;
        if self.completed {
            return Err(Error::new(ErrorKind::Usage).with_message("write after complete"));
        }
        self.data.extend_from_slice(&chunk);
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), Error> {
        self.completed = true;
        Ok(())
    }

    fn total_written(&self) -> Option<u64> {
        if self.completed {
            Some(self.data.len() as u64)
        } else {
            None
        }
    }
}
