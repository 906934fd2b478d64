//! Agent leg: connection, control events, the audio sender and the event
//! receiver.

mod client;
pub mod credentials;
mod link;
pub mod messages;

pub use client::{AgentConnector, DEFAULT_AGENT_URL, WebSocketAgentConnector};
pub use credentials::{CredentialError, DEFAULT_VALIDATION_URL, validate_api_key};
pub use link::{
    AgentReceiver, AgentSender, ReceiverExit, ReceiverReport, SenderReport, run_audio_sender,
};
pub use messages::{ControlEvent, EventError, FunctionCallRequest, FunctionCallResponse};
