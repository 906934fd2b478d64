//! Startup check of the agent API key.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

/// Default key validation endpoint.
pub const DEFAULT_VALIDATION_URL: &str = "https://api.deepgram.com/v1/projects";

const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No agent API key configured")]
    Missing,

    #[error("Agent API key rejected (HTTP {status})")]
    Rejected { status: u16 },

    #[error("Key validation request failed: {0}")]
    Request(String),
}

/// Ask the provider whether `api_key` is accepted.
pub async fn validate_api_key(
    client: &reqwest::Client,
    validation_url: &str,
    api_key: &str,
) -> Result<(), CredentialError> {
    if api_key.trim().is_empty() {
        return Err(CredentialError::Missing);
    }

    let response = client
        .get(validation_url)
        .timeout(VALIDATION_TIMEOUT)
        .header("Authorization", format!("Token {api_key}"))
        .send()
        .await
        .map_err(|e| CredentialError::Request(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::OK {
        info!("Agent API key is valid");
        Ok(())
    } else {
        warn!(status = status.as_u16(), "Agent API key validation failed");
        Err(CredentialError::Rejected {
            status: status.as_u16(),
        })
    }
}
