//! Telephony media-stream frame types.
//!
//! Inbound frames are JSON text messages tagged by `event`:
//!
//! ```json
//! {"event": "connected"}
//! {"event": "start", "start": {"streamSid": "MZ..."}}
//! {"event": "media", "media": {"track": "inbound", "payload": "<base64 µ-law>"}}
//! {"event": "stop"}
//! ```
//!
//! Outbound frames address the stream by `streamSid`:
//!
//! ```json
//! {"event": "media", "streamSid": "MZ...", "media": {"payload": "<base64>"}}
//! {"event": "clear", "streamSid": "MZ..."}
//! ```

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound Frames (Telephony -> Gateway)
// =============================================================================

/// Frames received from the telephony leg.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyInbound {
    /// Socket established, no stream yet
    Connected,

    /// Media stream started
    Start {
        /// Stream metadata
        start: StartMetadata,
    },

    /// One frame of call audio
    Media {
        /// Media payload
        media: InboundMedia,
    },

    /// Stream ended
    Stop,

    /// Any other event (`mark`, `dtmf`, ...)
    #[serde(other)]
    Unknown,
}

/// Metadata carried by a `start` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartMetadata {
    /// Stream identifier used to address outbound frames
    #[serde(rename = "streamSid")]
    pub stream_sid: String,

    /// Call identifier, when the provider sends one
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,

    /// Tracks included in the stream
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Audio payload of a `media` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMedia {
    /// Which side of the call the audio belongs to
    pub track: MediaTrack,

    /// Base64-encoded audio
    pub payload: String,
}

/// Audio track label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTrack {
    /// Caller audio
    Inbound,
    /// Audio played to the caller
    Outbound,
    #[serde(other)]
    Other,
}

// =============================================================================
// Outbound Frames (Gateway -> Telephony)
// =============================================================================

/// Frames sent to the telephony leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutbound {
    /// Audio to play to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Drop any audio still buffered for playback (barge-in)
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },

    /// Handshake reply used by the test socket
    Connected { message: String },

    /// Session failure notice sent before the socket closes
    Error { error: ErrorDetail },
}

/// Audio payload of an outbound `media` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    /// Base64-encoded audio
    pub payload: String,
}

/// Body of an outbound `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl TelephonyOutbound {
    /// Wrap raw agent audio as a media frame.
    pub fn media(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        TelephonyOutbound::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: BASE64_STANDARD.encode(audio),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TelephonyOutbound::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        TelephonyOutbound::Error {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
