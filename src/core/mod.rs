pub mod agent;
pub mod audio;
pub mod functions;
pub mod session;
pub mod telephony;
pub mod transport;

// Re-export commonly used types for convenience
pub use agent::{AgentConnector, FunctionCallRequest, FunctionCallResponse, WebSocketAgentConnector};
pub use audio::{AudioChunk, AudioFramer, frame_audio};
pub use functions::{
    FunctionDispatcher, FunctionError, FunctionHandler, FunctionRegistry, ParamType,
    ParameterSchema, WebhookFunction, handler_fn, typed,
};
pub use session::{CallSession, SessionConfig, SessionError, SessionReport, SessionState};
pub use transport::{BoxedSink, BoxedSource, Frame, FrameSink, FrameSource, TransportError};
