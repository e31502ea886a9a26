// Buffered random access over a forward-only source: reads are mirrored into
// a growing buffer and never issued backward. Memory grows with the bytes
// consumed unless the bounded variant is used.

use std::io::SeekFrom;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::chunk::ChunkSource;
use crate::error::{Error, ErrorKind};

/// Pull size while fast-forwarding toward a not-yet-buffered offset.
pub const FAST_FORWARD_CHUNK: usize = 64 * 1024;

#[derive(Debug)]
pub struct SeekReader<S> {
    source: S,
    buf: Vec<u8>,
    // Absolute offset of buf[0]; stays 0 unless bounded trimming discards.
    buf_start: u64,
    pos: u64,
    eof: bool,
    window: Option<usize>,
    scratch: Vec<u8>,
}

impl<S: ChunkSource> SeekReader<S> {
    /// Buffer everything ever read. Simple, unbounded memory.
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: Vec::new(),
            buf_start: 0,
            pos: 0,
            eof: false,
            window: None,
            scratch: vec![0u8; FAST_FORWARD_CHUNK],
        }
    }

    /// Keep at most `window` bytes behind the position; seeking or reading
    /// into a discarded range fails with `Unsupported`.
    pub fn bounded(source: S, window: usize) -> Self {
        let mut reader = Self::new(source);
        reader.window = Some(window);
        reader
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn buffered_end(&self) -> u64 {
        self.buf_start + self.buf.len() as u64
    }

    fn check_available(&self, offset: u64) -> Result<(), Error> {
        if offset < self.buf_start {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message("offset discarded by bounded buffering")
                .with_offset(offset));
        }
        Ok(())
    }

    // Read forward until `target` is buffered or the source ends; None means
    // read to the end.
    async fn fill_to(&mut self, target: Option<u64>, cancel: &CancelToken) -> Result<(), Error> {
        while !self.eof && target.is_none_or(|t| self.buffered_end() < t) {
            let n = self.source.read_chunk(&mut self.scratch, cancel).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.buf.extend_from_slice(&self.scratch[..n]);
        }
        Ok(())
    }

    fn trim(&mut self) {
        if let Some(window) = self.window {
            let keep_from = self.pos.saturating_sub(window as u64);
            if keep_from > self.buf_start {
                let drop = ((keep_from - self.buf_start) as usize).min(self.buf.len());
                self.buf.drain(..drop);
                self.buf_start += drop as u64;
            }
        }
    }

    /// Serve `dst.len()` bytes at the absolute `offset` without moving the
    /// position, fast-forwarding first if the range is not yet buffered.
    /// Returns fewer bytes only at end-of-source.
    pub async fn read_at(
        &mut self,
        offset: u64,
        dst: &mut [u8],
        cancel: &CancelToken,
    ) -> Result<usize, Error> {
        self.check_available(offset)?;
        self.fill_to(Some(offset + dst.len() as u64), cancel).await?;
        let end = self.buffered_end();
        if offset >= end {
            return Ok(0);
        }
        let start = (offset - self.buf_start) as usize;
        let n = dst.len().min((end - offset) as usize);
        dst[..n].copy_from_slice(&self.buf[start..start + n]);
        Ok(n)
    }

    /// Read at the logical position, advancing it.
    pub async fn read(&mut self, dst: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        let n = self.read_at(self.pos, dst, cancel).await?;
        self.pos += n as u64;
        self.trim();
        Ok(n)
    }

    /// Reposition, fast-forwarding when the target lies beyond the buffered
    /// range. `SeekFrom::End` forces a full read of the remainder. Positions
    /// past end-of-source are allowed; reads there return 0.
    pub async fn seek(&mut self, target: SeekFrom, cancel: &CancelToken) -> Result<u64, Error> {
        let absolute = match target {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => add_delta(self.pos, delta)?,
            SeekFrom::End(delta) => {
                self.fill_to(None, cancel).await?;
                add_delta(self.buffered_end(), delta)?
            }
        };
        self.check_available(absolute)?;
        self.fill_to(Some(absolute), cancel).await?;
        self.pos = absolute;
        self.trim();
        Ok(absolute)
    }

    /// Total source length. Forces a full fast-forward the first time.
    pub async fn len(&mut self, cancel: &CancelToken) -> Result<u64, Error> {
        self.fill_to(None, cancel).await?;
        Ok(self.buffered_end())
    }
}

fn add_delta(base: u64, delta: i64) -> Result<u64, Error> {
    base.checked_add_signed(delta)
        .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("seek before start of stream"))
}

#[async_trait]
impl<S: ChunkSource> ChunkSource for SeekReader<S> {
    async fn read_chunk(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        self.read(buf, cancel).await
    }
}
