//! Telephony leg: media-stream frames, the caller-audio reader and the
//! outbound frame writer.

mod link;
pub mod messages;

pub use link::{
    FrameError, InboundAction, ReaderExit, ReaderReport, TelephonyReader, TelephonySender,
    classify_frame,
};
pub use messages::{TelephonyInbound, TelephonyOutbound};
