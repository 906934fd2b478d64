use async_trait::async_trait;
use tokio_tungstenite::tungstenite;
use tracing::info;
use url::Url;
use zeroize::Zeroizing;

use crate::core::session::SessionError;
use crate::core::transport::{BoxedSink, BoxedSource, split_client_socket};

/// Default agent endpoint.
pub const DEFAULT_AGENT_URL: &str = "wss://agent.deepgram.com/v1/agent/converse";

/// Opens the agent leg of a call.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    /// Open a fresh agent connection.
    async fn connect(&self) -> Result<(BoxedSink, BoxedSource), SessionError>;

    /// Where this connector dials, for logging.
    fn endpoint(&self) -> &str;
}

/// Connects to the agent over a TLS websocket using token authentication.
pub struct WebSocketAgentConnector {
    url: String,
    api_key: Zeroizing<String>,
}

impl WebSocketAgentConnector {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: Zeroizing::new(api_key.into()),
        }
    }

    fn build_request(&self) -> Result<http::Request<()>, SessionError> {
        let url = Url::parse(&self.url)
            .map_err(|e| SessionError::AgentConnect(format!("Invalid agent URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| SessionError::AgentConnect("Agent URL has no host".to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Token {}", self.api_key.as_str()))
            .header("Sec-WebSocket-Protocol", "token")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| SessionError::AgentConnect(e.to_string()))
    }
}

#[async_trait]
impl AgentConnector for WebSocketAgentConnector {
    async fn connect(&self) -> Result<(BoxedSink, BoxedSource), SessionError> {
        let request = self.build_request()?;

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(classify_connect_error)?;

        info!(endpoint = %self.url, "Connected to agent");
        Ok(split_client_socket(socket))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

fn classify_connect_error(error: tungstenite::Error) -> SessionError {
    match error {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
                SessionError::AgentRejected(format!("HTTP {}", status.as_u16()))
            } else {
                SessionError::AgentConnect(format!("HTTP {}", status.as_u16()))
            }
        }
        other => SessionError::AgentConnect(other.to_string()),
    }
}
