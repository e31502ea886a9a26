//! Purpose: Bounded, backpressured byte channel between one writer and one reader task.
//! Exports: `pipe`, `PipeWriter`, `PipeReader`.
//! Role: The unit of backpressure for fan-out; a full ring suspends the writer,
//! an empty ring suspends the reader, and `complete` turns emptiness into end-of-stream.
//! Invariants: Ring state is touched only under the lock, never across an await.
//! Invariants: Waiters are one-shot handles armed under the lock, so wakeups are never lost.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::cancel::CancelToken;
use crate::error::{Error, ErrorKind};
use crate::ring::RingBuffer;

/// Create a pipe with the given ring capacity in bytes. The two halves are
/// the only handles; single-writer/single-reader holds by ownership.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            ring: RingBuffer::new(capacity),
            completed: false,
            written: 0,
            writer_gone: false,
            reader_gone: false,
            data_waiter: None,
            space_waiter: None,
        }),
    });
    (
        PipeWriter {
            shared: Arc::clone(&shared),
        },
        PipeReader { shared },
    )
}

#[derive(Debug)]
struct Inner {
    ring: RingBuffer,
    completed: bool,
    written: u64,
    writer_gone: bool,
    reader_gone: bool,
    data_waiter: Option<oneshot::Sender<()>>,
    space_waiter: Option<oneshot::Sender<()>>,
}

impl Inner {
    fn wake_reader(&mut self) {
        if let Some(waiter) = self.data_waiter.take() {
            let _ = waiter.send(());
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waiter) = self.space_waiter.take() {
            let _ = waiter.send(());
        }
    }
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("pipe lock")
    }
}

#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Write all of `buf`, suspending whenever the ring is full until the
    /// reader frees space. Errors: `Usage` after `complete`, `Closed` once
    /// the reader is gone, `Canceled` if the token fires mid-wait.
    pub async fn write(&mut self, buf: &[u8], cancel: &CancelToken) -> Result<(), Error> {
        cancel.check()?;
        let mut remaining = buf;
        loop {
            let wait = {
                let mut inner = self.shared.lock();
                if inner.completed {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("write after complete"));
                }
                if inner.reader_gone {
                    return Err(Error::new(ErrorKind::Closed)
                        .with_message("reader dropped"));
                }
                // Push until the ring stops accepting; a wrap needs two pushes.
                let mut moved = 0usize;
                loop {
                    let n = inner.ring.write(remaining);
                    if n == 0 {
                        break;
                    }
                    moved += n;
                    remaining = &remaining[n..];
                }
                if moved > 0 {
                    inner.written += moved as u64;
                    inner.wake_reader();
                }
                if remaining.is_empty() {
                    return Ok(());
                }
                let (tx, rx) = oneshot::channel();
                inner.space_waiter = Some(tx);
                rx
            };
            tokio::select! {
                _ = wait => {}
                _ = cancel.canceled() => {
                    return Err(Error::new(ErrorKind::Canceled)
                        .with_message("write canceled while waiting for space"));
                }
            }
        }
    }

    /// Mark the stream finished. Idempotent; wakes a blocked reader so it can
    /// drain the remainder and observe end-of-stream.
    pub fn complete(&mut self) {
        let mut inner = self.shared.lock();
        if !inner.completed {
            inner.completed = true;
            tracing::debug!(total = inner.written, "pipe completed");
        }
        inner.wake_reader();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.writer_gone = true;
        // Without a prior complete() the reader sees Closed, not clean EOF.
        inner.wake_reader();
    }
}

#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Read at least one byte, suspending while the ring is empty and the
    /// pipe is not completed. Returns 0 exactly when the pipe is completed
    /// and drained; that state is terminal and idempotent. A writer dropped
    /// without completing surfaces as `Closed` once the buffer is drained.
    pub async fn read(&mut self, dst: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        cancel.check()?;
        if dst.is_empty() {
            return Ok(0);
        }
        loop {
            let wait = {
                let mut inner = self.shared.lock();
                let n = inner.ring.read(dst);
                if n > 0 {
                    inner.wake_writer();
                    return Ok(n);
                }
                if inner.completed {
                    return Ok(0);
                }
                if inner.writer_gone {
                    return Err(Error::new(ErrorKind::Closed)
                        .with_message("writer dropped before completing"));
                }
                let (tx, rx) = oneshot::channel();
                inner.data_waiter = Some(tx);
                rx
            };
            tokio::select! {
                _ = wait => {}
                _ = cancel.canceled() => {
                    return Err(Error::new(ErrorKind::Canceled)
                        .with_message("read canceled while waiting for data"));
                }
            }
        }
    }

    /// Total bytes ever written, known only once the writer completed.
    pub fn total_written(&self) -> Option<u64> {
        let inner = self.shared.lock();
        if inner.completed {
            Some(inner.written)
        } else {
            None
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.reader_gone = true;
        inner.wake_writer();
    }
}

#[async_trait::async_trait]
impl crate::chunk::ChunkSink for PipeWriter {
    async fn write_chunk(&mut self, chunk: bytes::Bytes, cancel: &CancelToken) -> Result<(), Error> {
        self.write(&chunk, cancel).await
    }

    async fn complete(&mut self) -> Result<(), Error> {
        PipeWriter::complete(self);
        Ok(())
    }

    fn total_written(&self) -> Option<u64> {
        let inner = self.shared.lock();
        if inner.completed {
            Some(inner.written)
        } else {
            None
        }
    }
}

#[async_trait::async_trait]
impl crate::chunk::ChunkSource for PipeReader {
    async fn read_chunk(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<usize, Error> {
        self.read(buf, cancel).await
    }

    fn size_hint(&self) -> Option<u64> {
        self.total_written()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::pipe;
    use crate::cancel::{cancel_pair, CancelToken};
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn drains_then_signals_end_of_stream() {
        let (mut writer, mut reader) = pipe(16);
        let cancel = CancelToken::never();
        writer.write(b"hello", &cancel).await.expect("write");
        writer.complete();

        assert_eq!(reader.total_written(), Some(5));
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf, &cancel).await.expect("read"), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(reader.read(&mut buf, &cancel).await.expect("read"), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(reader.read(&mut buf, &cancel).await.expect("read"), 0);
        assert_eq!(reader.read(&mut buf, &cancel).await.expect("read"), 0);
    }

    #[tokio::test]
    async fn total_written_unknown_before_complete() {
        let (mut writer, reader) = pipe(16);
        let cancel = CancelToken::never();
        writer.write(b"abc", &cancel).await.expect("write");
        assert_eq!(reader.total_written(), None);
        writer.complete();
        assert_eq!(reader.total_written(), Some(3));
    }

    #[tokio::test]
    async fn write_after_complete_is_a_usage_error() {
        let (mut writer, _reader) = pipe(16);
        writer.complete();
        let err = writer
            .write(b"x", &CancelToken::never())
            .await
            .expect_err("write after complete");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn dropped_writer_surfaces_as_closed_after_drain() {
        let (mut writer, mut reader) = pipe(16);
        let cancel = CancelToken::never();
        writer.write(b"ab", &cancel).await.expect("write");
        drop(writer);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf, &cancel).await.expect("read"), 2);
        let err = reader.read(&mut buf, &cancel).await.expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::Closed);
    }

    #[tokio::test]
    async fn dropped_reader_fails_a_blocked_writer() {
        let (mut writer, reader) = pipe(2);
        let cancel = CancelToken::never();
        let task = tokio::spawn(async move {
            let result = writer.write(b"abcdef", &cancel).await;
            (writer, result)
        });
        tokio::task::yield_now().await;
        drop(reader);
        let (_writer, result) = task.await.expect("task");
        assert_eq!(result.expect_err("closed").kind(), ErrorKind::Closed);
    }

    #[tokio::test]
    async fn canceling_a_blocked_read_leaves_the_pipe_usable() {
        let (mut writer, mut reader) = pipe(16);
        let (handle, token) = cancel_pair();

        let read_task = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            let result = reader.read(&mut buf, &token).await;
            (reader, result)
        });
        tokio::task::yield_now().await;
        handle.cancel();
        let (mut reader, result) = read_task.await.expect("task");
        assert_eq!(result.expect_err("canceled").kind(), ErrorKind::Canceled);

        // The pipe state stayed consistent; a retry with a live token works.
        let cancel = CancelToken::never();
        writer.write(b"ok", &cancel).await.expect("write");
        writer.complete();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf, &cancel).await.expect("read"), 2);
        assert_eq!(&buf[..2], b"ok");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Any payload, any ring capacity, any read/write chunking: the reader
        // reassembles exactly the written bytes, in order.
        #[test]
        fn roundtrip_arbitrary_chunking(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            capacity in 1usize..512,
            write_chunk in 1usize..256,
            read_chunk in 1usize..256,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            rt.block_on(async {
                let (mut writer, mut reader) = pipe(capacity);
                let expected = data.clone();
                let writer_task = tokio::spawn(async move {
                    let cancel = CancelToken::never();
                    for chunk in data.chunks(write_chunk) {
                        writer.write(chunk, &cancel).await.expect("write");
                    }
                    writer.complete();
                });

                let cancel = CancelToken::never();
                let mut out = Vec::new();
                let mut buf = vec![0u8; read_chunk];
                loop {
                    let n = reader.read(&mut buf, &cancel).await.expect("read");
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
                writer_task.await.expect("writer task");
                assert_eq!(out, expected);
                assert_eq!(reader.total_written(), Some(expected.len() as u64));
            });
        }
    }
}
