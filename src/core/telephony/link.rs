use std::sync::Arc;

use base64::prelude::*;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::messages::{MediaTrack, TelephonyInbound, TelephonyOutbound};
use crate::core::audio::{AudioChunk, AudioFramer};
use crate::core::session::{HandoffError, SessionError, StreamIdWriter};
use crate::core::transport::{BoxedSink, BoxedSource, Frame, TransportError};

/// A telephony frame that could not be understood.
///
/// Frame errors only affect the offending frame; the reader logs them and
/// keeps going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid telephony frame: {0}")]
    Decode(String),

    #[error("Invalid media payload: {0}")]
    Payload(String),

    #[error("Unexpected binary frame ({0} bytes)")]
    UnexpectedBinary(usize),
}

/// What the reader should do with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAction {
    /// Publish the stream identifier
    StreamStarted(String),
    /// Feed caller audio to the framer
    Audio(Bytes),
    /// Nothing to do
    Ignore,
    /// The stream is over
    Stop,
}

/// Decode one text frame into an action.
pub fn classify_frame(text: &str) -> Result<InboundAction, FrameError> {
    let frame: TelephonyInbound =
        serde_json::from_str(text).map_err(|e| FrameError::Decode(e.to_string()))?;

    Ok(match frame {
        TelephonyInbound::Start { start } => InboundAction::StreamStarted(start.stream_sid),
        TelephonyInbound::Media { media } if media.track == MediaTrack::Inbound => {
            let audio = BASE64_STANDARD
                .decode(media.payload.as_bytes())
                .map_err(|e| FrameError::Payload(e.to_string()))?;
            InboundAction::Audio(Bytes::from(audio))
        }
        TelephonyInbound::Media { .. } => InboundAction::Ignore,
        TelephonyInbound::Stop => InboundAction::Stop,
        TelephonyInbound::Connected | TelephonyInbound::Unknown => InboundAction::Ignore,
    })
}

// =============================================================================
// Sender
// =============================================================================

/// Shared writer for the telephony socket.
///
/// Both the agent receiver and session teardown write here, so the sink sits
/// behind a mutex and every frame goes out whole.
#[derive(Clone)]
pub struct TelephonySender {
    sink: Arc<Mutex<BoxedSink>>,
}

impl TelephonySender {
    pub fn new(sink: BoxedSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub async fn send_media(&self, stream_sid: &str, audio: &[u8]) -> Result<(), TransportError> {
        self.send(&TelephonyOutbound::media(stream_sid, audio)).await
    }

    pub async fn send_clear(&self, stream_sid: &str) -> Result<(), TransportError> {
        self.send(&TelephonyOutbound::clear(stream_sid)).await
    }

    pub async fn send_error(&self, code: &str, message: &str) -> Result<(), TransportError> {
        self.send(&TelephonyOutbound::error(code, message)).await
    }

    pub async fn send(&self, frame: &TelephonyOutbound) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame).map_err(|e| TransportError::Send(e.to_string()))?;
        self.sink.lock().await.send(Frame::Text(text)).await
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Why the telephony reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The peer sent `stop`
    Stopped,
    /// The socket closed without `stop`
    PeerClosed,
    /// The session asked the reader to stop
    Cancelled,
}

/// Counters collected by the telephony reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderReport {
    pub exit: ReaderExit,
    pub frames: u64,
    pub malformed_frames: u64,
    pub chunks_queued: u64,
    pub discarded_bytes: usize,
}

/// Reads telephony frames, frames caller audio into agent-sized chunks and
/// publishes the stream identifier.
pub struct TelephonyReader {
    source: BoxedSource,
    framer: AudioFramer,
    audio_tx: mpsc::UnboundedSender<AudioChunk>,
    stream_id: StreamIdWriter,
}

impl TelephonyReader {
    pub fn new(
        source: BoxedSource,
        framer: AudioFramer,
        audio_tx: mpsc::UnboundedSender<AudioChunk>,
        stream_id: StreamIdWriter,
    ) -> Self {
        Self {
            source,
            framer,
            audio_tx,
            stream_id,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<ReaderReport, SessionError> {
        let mut frames = 0u64;
        let mut malformed_frames = 0u64;
        let mut chunks_queued = 0u64;

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break ReaderExit::Cancelled,
                next = self.source.next_frame() => next,
            };

            let text = match next {
                None | Some(Ok(Frame::Close)) => break ReaderExit::PeerClosed,
                Some(Err(e)) => return Err(SessionError::TelephonyTransport(e)),
                Some(Ok(Frame::Binary(data))) => {
                    frames += 1;
                    malformed_frames += 1;
                    warn!(error = %FrameError::UnexpectedBinary(data.len()), "Dropping telephony frame");
                    continue;
                }
                Some(Ok(Frame::Text(text))) => text,
            };
            frames += 1;

            match classify_frame(&text) {
                Ok(InboundAction::StreamStarted(stream_sid)) => {
                    match self.stream_id.assign(stream_sid.as_str()) {
                        Ok(()) => info!(stream_sid = %stream_sid, "Telephony stream started"),
                        Err(e @ HandoffError::AlreadyAssigned { .. }) => {
                            warn!(error = %e, "Ignoring repeated start frame")
                        }
                        Err(e) => warn!(error = %e, "Stream identifier handoff failed"),
                    }
                }
                Ok(InboundAction::Audio(audio)) => {
                    for chunk in self.framer.push(&audio) {
                        self.audio_tx
                            .send(chunk)
                            .map_err(|_| SessionError::AudioQueueClosed)?;
                        chunks_queued += 1;
                    }
                }
                Ok(InboundAction::Stop) => {
                    info!("Telephony stream stopped");
                    break ReaderExit::Stopped;
                }
                Ok(InboundAction::Ignore) => trace!("Ignoring telephony frame"),
                Err(e) => {
                    malformed_frames += 1;
                    warn!(error = %e, "Dropping telephony frame");
                }
            }
        };

        let discarded_bytes = self.framer.finish();
        if discarded_bytes > 0 {
            debug!(
                discarded_bytes,
                "Discarding trailing audio shorter than one chunk"
            );
        }

        Ok(ReaderReport {
            exit,
            frames,
            malformed_frames,
            chunks_queued,
            discarded_bytes,
        })
    }
}
