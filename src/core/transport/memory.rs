//! In-memory transport pairs.
//!
//! [`pair`] returns the relay-facing halves plus a [`MemoryPeer`] that plays
//! the remote end: it injects inbound frames (or transport errors) and
//! observes everything the relay sends. [`StalledSink`] stands in for a peer
//! that stopped reading.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Frame, FrameSink, FrameSource, TransportError};

/// Relay-facing outbound half backed by a channel.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<Frame>,
    closed: bool,
}

/// Relay-facing inbound half backed by a channel.
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

/// The remote end of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
}

/// Create a connected in-memory transport.
pub fn pair() -> (MemorySink, MemorySource, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        MemorySink {
            tx: out_tx,
            closed: false,
        },
        MemorySource { rx: in_rx },
        MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
        },
    )
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tx
            .send(Frame::Close)
            .map_err(|_| TransportError::Closed)
    }
}

/// Outbound half whose writes and close never complete.
#[derive(Debug, Default)]
pub struct StalledSink;

#[async_trait]
impl FrameSink for StalledSink {
    async fn send(&mut self, _frame: Frame) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        std::future::pending().await
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await
    }
}

impl MemoryPeer {
    /// Deliver a frame to the relay. Returns false once the relay side is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.send(Frame::Binary(data.into()))
    }

    /// Make the relay's next read fail with `error`.
    pub fn send_error(&self, error: TransportError) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// Drop the inbound direction; the relay reads end-of-stream.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Next frame sent by the relay, or `None` once the relay dropped its sink.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Drain every frame already sent by the relay without waiting.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
