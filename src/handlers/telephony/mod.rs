//! Telephony media-stream WebSocket handlers
//!
//! # Protocol
//!
//! ## Telephony → Server
//!
//! - **connected**: socket established
//! - **start**: stream started, carries `streamSid`
//! - **media**: base64 µ-law audio on the `inbound` track
//! - **stop**: stream ended
//!
//! ## Server → Telephony
//!
//! - **media**: agent audio for `streamSid`
//! - **clear**: drop buffered playback (caller barged in)
//! - **error**: the call failed; the socket closes right after
//!
//! The `/test` endpoint answers with a single `connected` frame and closes.

mod handler;

pub use handler::{telephony_handler, test_socket_handler};
