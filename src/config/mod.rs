//! Configuration module for the call bridge
//!
//! Server configuration comes from .env files, environment variables and an
//! optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Environment parsing helpers
//!
//! # Example
//! ```rust,no_run
//! use callbridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::core::functions::ParameterSchema;
use crate::core::session::SessionConfig;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SETTINGS_PATH: &str = "config.json";
pub const DEFAULT_TELEPHONY_PATH: &str = "/twilio";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Agent connection settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent websocket endpoint
    pub url: String,
    /// Agent API key; calls cannot be served without one
    pub api_key: Option<String>,
    /// JSON settings document sent at the start of every call
    pub settings_path: PathBuf,
    pub connect_timeout_secs: u64,
    /// Per-message receive bound on the agent socket (disabled when `None`)
    pub receive_timeout_secs: Option<u64>,
    /// Check the API key against `validation_url` before serving
    pub validate_on_startup: bool,
    pub validation_url: String,
}

/// Zeroize the API key when the agent configuration is dropped.
impl Drop for AgentConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

/// A webhook-backed function declared in configuration
#[derive(Debug, Clone)]
pub struct FunctionConfig {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub parameters: ParameterSchema,
    /// Extra request headers (e.g. API keys for the business backend)
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Agent connection settings
/// - Audio framing and telephony endpoint
/// - Function definitions
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Agent connection
    pub agent: AgentConfig,

    // Audio framing
    pub audio_chunk_size_bytes: usize,

    // Telephony endpoint
    pub telephony_path: String,
    /// Maximum concurrent calls
    /// Default: None (unlimited)
    pub max_concurrent_calls: Option<usize>,

    // Functions
    pub function_call_timeout_secs: Option<u64>,
    pub functions: Vec<FunctionConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Loads configuration from environment variables with defaults and
    /// validates the result.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Agent API key, if configured
    pub fn agent_api_key(&self) -> Option<&str> {
        self.agent
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.connect_timeout_secs)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.agent.receive_timeout_secs.map(Duration::from_secs)
    }

    pub fn function_call_timeout(&self) -> Option<Duration> {
        self.function_call_timeout_secs.map(Duration::from_secs)
    }

    /// Per-call tuning derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_size: self.audio_chunk_size_bytes,
            connect_timeout: self.connect_timeout(),
            receive_timeout: self.receive_timeout(),
            ..SessionConfig::default()
        }
    }

    /// Read the agent settings document
    ///
    /// The document must be a JSON object; it is sent verbatim as the first
    /// frame of every call.
    pub fn load_agent_settings(&self) -> Result<Value, Box<dyn std::error::Error>> {
        let path = &self.agent.settings_path;
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read agent settings {}: {e}", path.display()))?;

        let settings: Value = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse agent settings {}: {e}", path.display()))?;

        if !settings.is_object() {
            return Err(format!(
                "Agent settings {} must contain a JSON object",
                path.display()
            )
            .into());
        }

        Ok(settings)
    }
}
