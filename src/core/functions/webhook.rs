//! Functions backed by an HTTP endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::handler::{FunctionError, FunctionHandler};

/// Default request timeout for webhook functions.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwards the call arguments as a JSON POST body and returns the JSON
/// response body as the function result.
pub struct WebhookFunction {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookFunction {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers: HashMap::new(),
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a client between webhooks.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl FunctionHandler for WebhookFunction {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, FunctionError> {
        debug!(function = %self.name, url = %self.url, "Calling function webhook");

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header("X-Function-Name", &self.name);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .json(&Value::Object(arguments))
            .send()
            .await
            .map_err(|e| FunctionError::failed(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FunctionError::failed(format!(
                "Webhook returned status {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FunctionError::failed(format!("Failed to read webhook response: {e}")))?;
        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&body)
            .map_err(|e| FunctionError::failed(format!("Webhook returned invalid JSON: {e}")))
    }
}
