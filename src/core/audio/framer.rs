//! Re-framing of inbound telephony audio into fixed-size agent chunks.
//!
//! Telephony media streams deliver 20ms frames of 8kHz µ-law audio (160 bytes
//! each). The agent socket is fed in larger units: by default 20 telephony
//! frames (3200 bytes, 400ms) per binary message.

use bytes::{Bytes, BytesMut};

/// Size of a single telephony media frame in bytes (20ms of 8kHz µ-law).
pub const TELEPHONY_FRAME_BYTES: usize = 160;

/// Number of telephony frames carried by one agent chunk.
pub const FRAMES_PER_CHUNK: usize = 20;

/// Default agent chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = FRAMES_PER_CHUNK * TELEPHONY_FRAME_BYTES;

/// One unit of caller audio ready to be sent to the agent.
///
/// Chunks are immutable once produced and always exactly `chunk_size` bytes
/// long for the framer that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk(Bytes);

impl AudioChunk {
    /// Length of the chunk in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw audio bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the chunk, returning the underlying buffer without copying.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(data: Vec<u8>) -> Self {
        AudioChunk(Bytes::from(data))
    }
}

impl From<Bytes> for AudioChunk {
    fn from(data: Bytes) -> Self {
        AudioChunk(data)
    }
}

/// Append-only audio buffer that emits fixed-size chunks.
///
/// Whenever the buffered length reaches the chunk size, the first
/// `chunk_size` bytes are split off as an [`AudioChunk`]. A trailing fragment
/// shorter than a chunk is never emitted; [`AudioFramer::finish`] discards it
/// and reports how many bytes were dropped.
#[derive(Debug)]
pub struct AudioFramer {
    buffer: BytesMut,
    chunk_size: usize,
}

impl AudioFramer {
    /// Create a framer emitting chunks of `chunk_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero. Configuration validation rejects a
    /// zero chunk size before a framer is ever built.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            buffer: BytesMut::with_capacity(chunk_size * 2),
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of bytes waiting for a complete chunk.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append decoded audio and return every chunk that became complete, in
    /// capture order.
    pub fn push(&mut self, data: &[u8]) -> Vec<AudioChunk> {
        self.buffer.extend_from_slice(data);

        let ready = self.buffer.len() / self.chunk_size;
        let mut chunks = Vec::with_capacity(ready);
        for _ in 0..ready {
            let chunk = self.buffer.split_to(self.chunk_size).freeze();
            chunks.push(AudioChunk(chunk));
        }
        chunks
    }

    /// End of stream. The partial remainder is dropped; returns its length.
    pub fn finish(mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        discarded
    }
}

impl Default for AudioFramer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Split a complete byte sequence into chunks of `chunk_size` bytes.
///
/// Returns the chunks in order and the length of the discarded remainder.
pub fn frame_audio(data: &[u8], chunk_size: usize) -> (Vec<AudioChunk>, usize) {
    let mut framer = AudioFramer::new(chunk_size);
    let chunks = framer.push(data);
    (chunks, framer.finish())
}
