//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use callbridge_gateway::ServerConfig;
use callbridge_gateway::config::AgentConfig;
use callbridge_gateway::core::agent::{AgentConnector, DEFAULT_VALIDATION_URL};
use callbridge_gateway::core::session::SessionError;
use callbridge_gateway::core::transport::{BoxedSink, BoxedSource, Frame, memory};
use serde_json::Value;
use tokio::time::timeout;

/// Bound on every wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

/// Minimal configuration with no TLS, no functions and no call limit
pub fn test_config(agent_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        agent: AgentConfig {
            url: agent_url.to_string(),
            api_key: Some("test_agent_key".to_string()),
            settings_path: PathBuf::from("config.json"),
            connect_timeout_secs: 5,
            receive_timeout_secs: None,
            validate_on_startup: false,
            validation_url: DEFAULT_VALIDATION_URL.to_string(),
        },
        audio_chunk_size_bytes: 3200,
        telephony_path: "/twilio".to_string(),
        max_concurrent_calls: None,
        function_call_timeout_secs: None,
        functions: Vec::new(),
    }
}

/// Connector that hands out one pre-built in-memory agent connection
pub struct MemoryConnector {
    halves: Mutex<Option<(BoxedSink, BoxedSource)>>,
}

impl MemoryConnector {
    /// Build the connector and the peer playing the agent
    pub fn pair() -> (Self, memory::MemoryPeer) {
        let (sink, source, peer) = memory::pair();
        (
            Self {
                halves: Mutex::new(Some((Box::new(sink), Box::new(source)))),
            },
            peer,
        )
    }
}

#[async_trait]
impl AgentConnector for MemoryConnector {
    async fn connect(&self) -> Result<(BoxedSink, BoxedSource), SessionError> {
        self.halves
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SessionError::AgentConnect("connection already used".into()))
    }

    fn endpoint(&self) -> &str {
        "memory://agent"
    }
}

/// Next frame from a peer, failing the test if nothing arrives in time
pub async fn next_frame(peer: &mut memory::MemoryPeer) -> Frame {
    timeout(WAIT, peer.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("relay dropped its sink")
}

/// Next frame, which must be JSON text
pub async fn next_json(peer: &mut memory::MemoryPeer) -> Value {
    match next_frame(peer).await {
        Frame::Text(text) => serde_json::from_str(&text).expect("frame is not JSON"),
        other => panic!("Expected a text frame, got {other:?}"),
    }
}

/// Telephony `media` event carrying `audio`
pub fn media_event(audio: &[u8]) -> String {
    use base64::prelude::*;

    serde_json::json!({
        "event": "media",
        "media": { "track": "inbound", "payload": BASE64_STANDARD.encode(audio) }
    })
    .to_string()
}

pub fn start_event(stream_sid: &str) -> String {
    serde_json::json!({
        "event": "start",
        "start": { "streamSid": stream_sid, "callSid": "CA-test", "tracks": ["inbound"] }
    })
    .to_string()
}

pub const STOP_EVENT: &str = r#"{"event":"stop"}"#;

