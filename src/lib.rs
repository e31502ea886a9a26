//! Purpose: Streaming toolkit for feeding one forward-only byte source to many independent consumers.
//! Exports: `pipe` (bounded backpressured byte channel), `distribute` (fan-out), `SeekReader`, `PeekReader`, boundary traits, cancellation.
//! Role: The algorithmic core between byte producers (upload bodies, archive entries) and byte consumers (digests, remote stores).
//! Invariants: Memory stays bounded by ring capacity during fan-out regardless of payload size.
//! Invariants: End-of-stream is always an explicit completion signal, never inferred from emptiness.

pub mod cancel;
pub mod chunk;
pub mod error;
pub mod fanout;
pub mod peek;
pub mod pipe;
pub mod ring;
pub mod seek;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use chunk::{ChunkSink, ChunkSource, DigestSink, NullSink, ReaderSource, VecSink, WriterSink};
pub use error::{Error, ErrorKind};
pub use fanout::{distribute, DEFAULT_CHUNK_SIZE};
pub use peek::PeekReader;
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use ring::{RingBuffer, DEFAULT_CAPACITY};
pub use seek::SeekReader;
