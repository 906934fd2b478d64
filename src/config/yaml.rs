use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::functions::ParameterSchema;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5000
///   tls:
///     cert_path: "/etc/callbridge/cert.pem"
///     key_path: "/etc/callbridge/key.pem"
///
/// agent:
///   url: "wss://agent.deepgram.com/v1/agent/converse"
///   api_key: "your-deepgram-key"
///   settings_path: "config.json"
///   connect_timeout_secs: 10
///   receive_timeout_secs: 120
///   validate_on_startup: true
///
/// audio:
///   chunk_size_bytes: 3200
///
/// telephony:
///   path: "/twilio"
///   max_concurrent_calls: 50
///
/// functions:
///   call_timeout_secs: 8
///   definitions:
///     - name: "place_order"
///       description: "Place a coffee order"
///       url: "https://orders.example.com/place"
///       headers:
///         X-Api-Key: "secret"
///       parameters:
///         type: object
///         properties:
///           item: { type: string }
///         required: [item]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub agent: Option<AgentYaml>,
    pub audio: Option<AudioYaml>,
    pub telephony: Option<TelephonyYaml>,
    pub functions: Option<FunctionsYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Agent connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub settings_path: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub receive_timeout_secs: Option<u64>,
    pub validate_on_startup: Option<bool>,
    pub validation_url: Option<String>,
}

/// Audio framing from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub chunk_size_bytes: Option<usize>,
}

/// Telephony endpoint from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TelephonyYaml {
    pub path: Option<String>,
    pub max_concurrent_calls: Option<usize>,
}

/// Function registry from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FunctionsYaml {
    pub call_timeout_secs: Option<u64>,
    pub definitions: Vec<FunctionYaml>,
}

/// One webhook-backed function
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionYaml {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<ParameterSchema>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
