//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `telephony` - Telephony media-stream WebSocket and the `/test` socket

pub mod api;
pub mod telephony;

// Re-export commonly used handlers for convenient access
pub use api::health_check;
pub use telephony::{telephony_handler, test_socket_handler};
