// Bounded lookahead over any source: inspect the next bytes (e.g. a magic
// number deciding which processor gets the stream) without consuming them.

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::chunk::ChunkSource;
use crate::error::{Error, ErrorKind};

#[derive(Debug)]
pub struct PeekReader<S> {
    source: S,
    lookahead: Box<[u8]>,
    // Bytes sitting at the front of `lookahead`, peeked but not yet consumed.
    buffered: usize,
}

impl<S: ChunkSource> PeekReader<S> {
    pub fn new(source: S, max_peek: usize) -> Self {
        Self {
            source,
            lookahead: vec![0u8; max_peek].into_boxed_slice(),
            buffered: 0,
        }
    }

    pub fn max_peek(&self) -> usize {
        self.lookahead.len()
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Fill `dst` with the upcoming bytes without consuming them: a later
    /// `read` sees them again. Returns exactly `dst.len()` bytes unless the
    /// source ends first (fewer than requested signals end-of-source, unlike
    /// `read`, which may return short at any time). Asking for more than
    /// `max_peek` is a `Usage` error.
    pub async fn peek(&mut self, dst: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        let want = dst.len();
        if want > self.lookahead.len() {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "peek of {want} bytes exceeds lookahead capacity {}",
                self.lookahead.len()
            )));
        }
        while self.buffered < want {
            let n = self
                .source
                .read_chunk(&mut self.lookahead[self.buffered..want], cancel)
                .await?;
            if n == 0 {
                break;
            }
            self.buffered += n;
        }
        let peeked = want.min(self.buffered);
        dst[..peeked].copy_from_slice(&self.lookahead[..peeked]);
        Ok(peeked)
    }

    /// Serve previously peeked bytes first, then read the remainder straight
    /// from the source.
    pub async fn read(&mut self, dst: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        let from_lookahead = dst.len().min(self.buffered);
        if from_lookahead > 0 {
            dst[..from_lookahead].copy_from_slice(&self.lookahead[..from_lookahead]);
            self.buffered -= from_lookahead;
            if self.buffered > 0 {
                // Compact the unconsumed remainder to the front.
                self.lookahead
                    .copy_within(from_lookahead..from_lookahead + self.buffered, 0);
            }
        }
        if dst.len() > from_lookahead {
            let n = self
                .source
                .read_chunk(&mut dst[from_lookahead..], cancel)
                .await?;
            Ok(from_lookahead + n)
        } else {
            Ok(from_lookahead)
        }
    }
}

#[async_trait]
impl<S: ChunkSource> ChunkSource for PeekReader<S> {
    async fn read_chunk(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        self.read(buf, cancel).await
    }

    fn size_hint(&self) -> Option<u64> {
        self.source.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::PeekReader;
    use crate::cancel::CancelToken;
    use crate::chunk::ReaderSource;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn peek_then_read_sees_the_same_bytes() {
        let mut reader = PeekReader::new(ReaderSource::new(&b"PK\x03\x04rest-of-archive"[..]), 8);
        let cancel = CancelToken::never();

        let mut magic = [0u8; 4];
        assert_eq!(reader.peek(&mut magic, &cancel).await.expect("peek"), 4);
        assert_eq!(&magic, b"PK\x03\x04");

        // Peeking again does not advance either.
        assert_eq!(reader.peek(&mut magic, &cancel).await.expect("peek"), 4);
        assert_eq!(&magic, b"PK\x03\x04");

        let mut body = [0u8; 4];
        assert_eq!(reader.read(&mut body, &cancel).await.expect("read"), 4);
        assert_eq!(&body, b"PK\x03\x04");
    }

    #[tokio::test]
    async fn partial_consumption_compacts_the_lookahead() {
        let mut reader = PeekReader::new(ReaderSource::new(&b"abcdefgh"[..]), 6);
        let cancel = CancelToken::never();

        let mut six = [0u8; 6];
        assert_eq!(reader.peek(&mut six, &cancel).await.expect("peek"), 6);

        let mut two = [0u8; 2];
        assert_eq!(reader.read(&mut two, &cancel).await.expect("read"), 2);
        assert_eq!(&two, b"ab");

        // The remaining four peeked bytes moved to the front and come first.
        let mut rest = [0u8; 6];
        let n = reader.read(&mut rest, &cancel).await.expect("read");
        assert_eq!(&rest[..n], &b"cdefgh"[..n]);
        assert!(n >= 4, "the four unconsumed lookahead bytes must be served");
    }

    #[tokio::test]
    async fn short_peek_signals_end_of_source() {
        let mut reader = PeekReader::new(ReaderSource::new(&b"abc"[..]), 8);
        let cancel = CancelToken::never();
        let mut buf = [0u8; 8];
        assert_eq!(reader.peek(&mut buf, &cancel).await.expect("peek"), 3);
        assert_eq!(&buf[..3], b"abc");
        // The short peek did not consume anything.
        let mut out = [0u8; 8];
        assert_eq!(reader.read(&mut out, &cancel).await.expect("read"), 3);
        assert_eq!(&out[..3], b"abc");
    }

    #[tokio::test]
    async fn over_capacity_peek_is_rejected() {
        let mut reader = PeekReader::new(ReaderSource::new(&b"abc"[..]), 4);
        let mut buf = [0u8; 5];
        let err = reader
            .peek(&mut buf, &CancelToken::never())
            .await
            .expect_err("beyond capacity");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
