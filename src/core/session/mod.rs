//! Call sessions: one per accepted telephony socket.

mod call;
mod error;
mod stream_id;

pub use call::{
    CallSession, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DRAIN_TIMEOUT, SessionConfig, SessionReport,
    SessionState, Worker,
};
pub use error::{HandoffError, SessionError};
pub use stream_id::{StreamIdReader, StreamIdWriter, handoff};
