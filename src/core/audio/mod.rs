//! Caller audio framing.

mod framer;

pub use framer::{
    AudioChunk, AudioFramer, DEFAULT_CHUNK_SIZE, FRAMES_PER_CHUNK, TELEPHONY_FRAME_BYTES,
    frame_audio,
};
