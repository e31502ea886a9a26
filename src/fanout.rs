//! Purpose: Feed every sink the exact byte stream one source produces.
//! Exports: `distribute`, `DEFAULT_CHUNK_SIZE`.
//! Role: One read fans out to N independently-paced consumers; the slowest
//! sink throttles the source via the sinks' own backpressure.
//! Invariants: The next chunk is not read until every sink accepted the
//! current one; completion is signaled to every sink in order, exactly once.
//! Invariants: A sink failure aborts immediately; earlier sinks keep a
//! byte-complete prefix but never see a completion signal.

use bytes::BytesMut;

use crate::cancel::CancelToken;
use crate::chunk::{ChunkSink, ChunkSource};
use crate::error::Error;

/// Matches the transfer granularity of typical upload bodies.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Read `source` to exhaustion in `chunk_size` runs, writing each run to
/// every sink in order before the next read, then complete every sink in
/// order. Returns the total byte count distributed. Errors are annotated
/// with the index of the failing sink; on any failure the caller must treat
/// all sinks' output as invalid.
pub async fn distribute<S>(
    source: &mut S,
    sinks: &mut [&mut dyn ChunkSink],
    chunk_size: usize,
    cancel: &CancelToken,
) -> Result<u64, Error>
where
    S: ChunkSource + ?Sized,
{
    tracing::debug!(sinks = sinks.len(), chunk_size, "distribution started");
    let mut total = 0u64;
    loop {
        let mut buf = BytesMut::zeroed(chunk_size);
        let n = source.read_chunk(&mut buf, cancel).await?;
        if n == 0 {
            break;
        }
        buf.truncate(n);
        let chunk = buf.freeze();
        for (index, sink) in sinks.iter_mut().enumerate() {
            sink.write_chunk(chunk.clone(), cancel)
                .await
                .map_err(|err| err.with_sink(index))?;
        }
        total += n as u64;
        tracing::trace!(bytes = n, total, "chunk distributed");
    }
    for (index, sink) in sinks.iter_mut().enumerate() {
        sink.complete()
            .await
            .map_err(|err| err.with_sink(index))?;
    }
    tracing::debug!(total, "distribution completed");
    Ok(total)
}
