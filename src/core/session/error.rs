use std::time::Duration;

use thiserror::Error;

use crate::core::transport::TransportError;

/// Errors that end a call session.
///
/// Frame-local problems (a malformed telephony frame, an undecodable agent
/// event, a failing function handler) never surface here; they are logged or
/// answered in-band and the session keeps running.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// Could not open the agent connection
    #[error("Agent connection failed: {0}")]
    AgentConnect(String),

    /// The agent refused the credentials
    #[error("Agent rejected the connection: {0}")]
    AgentRejected(String),

    /// Opening the agent connection took too long
    #[error("Agent connection timed out after {}s", .0.as_secs())]
    ConnectTimeout(Duration),

    /// The agent went quiet for longer than the receive timeout
    #[error("No agent message received for {}s", .0.as_secs())]
    ReceiveTimeout(Duration),

    /// Settings could not be delivered to the agent
    #[error("Failed to send agent settings: {0}")]
    SettingsSend(TransportError),

    /// Reading from or writing to the agent failed
    #[error("Agent transport failed: {0}")]
    AgentTransport(TransportError),

    /// Reading from or writing to the telephony peer failed
    #[error("Telephony transport failed: {0}")]
    TelephonyTransport(TransportError),

    /// The audio queue consumer went away while audio was still arriving
    #[error("Audio queue closed")]
    AudioQueueClosed,

    /// A worker task panicked or was aborted
    #[error("Session worker failed: {0}")]
    Worker(String),
}

impl SessionError {
    /// Error code reported to the telephony peer.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::AgentConnect(_) | SessionError::ConnectTimeout(_) => {
                "AGENT_CONNECTION_FAILED"
            }
            SessionError::AgentRejected(_) => "AGENT_REJECTED",
            SessionError::SettingsSend(_) => "AGENT_SETTINGS_FAILED",
            SessionError::ReceiveTimeout(_) => "AGENT_TIMEOUT",
            _ => "WEBSOCKET_ERROR",
        }
    }
}

/// Errors from the stream identifier handoff.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandoffError {
    /// A stream identifier was already published for this call
    #[error("Stream identifier already assigned ({current}); ignoring {rejected}")]
    AlreadyAssigned { current: String, rejected: String },

    /// The writer was dropped before publishing
    #[error("Stream identifier was never assigned")]
    WriterDropped,
}
