//! Transport seam between the relay and concrete websocket implementations.
//!
//! The relay speaks in terms of [`Frame`]s pushed into a [`FrameSink`] and
//! pulled from a [`FrameSource`]. Adapters exist for:
//!
//! - axum server-side websockets (the telephony leg)
//! - tokio-tungstenite client websockets (the agent leg)
//! - in-memory channel pairs ([`memory::pair`]) used by tests
//!
//! Ping/pong control frames never reach the relay; the adapters either skip
//! them or let the underlying library answer them.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

mod client_socket;
pub mod memory;
mod server_socket;

pub use client_socket::{ClientSocketSink, ClientSocketSource, split_client_socket};
pub use server_socket::{ServerSocketSink, ServerSocketSource, split_server_socket};

/// A single websocket data frame as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame (JSON control messages)
    Text(String),
    /// Binary frame (raw audio)
    Binary(Bytes),
    /// The peer is closing the connection
    Close,
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }
}

/// Errors raised by a transport adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Writing a frame failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Reading a frame failed
    #[error("Receive failed: {0}")]
    Receive(String),

    /// The connection is already closed
    #[error("Connection closed")]
    Closed,
}

/// Outbound half of a duplex connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Transmit a frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the connection. Further sends fail.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a duplex connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next data frame. `None` means the peer is gone.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Boxed outbound half.
pub type BoxedSink = Box<dyn FrameSink>;

/// Boxed inbound half.
pub type BoxedSource = Box<dyn FrameSource>;
