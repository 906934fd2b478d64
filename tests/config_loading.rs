//! Configuration Loading Tests
//!
//! Load a YAML file plus an agent settings document from disk and build the
//! application state from them.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use callbridge_gateway::{AppState, ServerConfig};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

const ENV_VARS: [&str; 7] = [
    "DEEPGRAM_API_KEY",
    "AGENT_SETTINGS_PATH",
    "AGENT_VALIDATE_ON_STARTUP",
    "TELEPHONY_PATH",
    "AUDIO_CHUNK_SIZE_BYTES",
    "MAX_CONCURRENT_CALLS",
    "FUNCTION_CALL_TIMEOUT_SECS",
];

fn cleanup_env_vars() {
    for name in ENV_VARS {
        unsafe {
            env::remove_var(name);
        }
    }
}

fn write_files(dir: &TempDir, settings: &str) -> PathBuf {
    let settings_path = dir.path().join("agent.json");
    fs::write(&settings_path, settings).unwrap();

    let yaml = format!(
        r#"
agent:
  api_key: "yaml-agent-key"
  settings_path: "{}"
  validate_on_startup: false

audio:
  chunk_size_bytes: 1600

telephony:
  path: "/calls"
  max_concurrent_calls: 4

functions:
  call_timeout_secs: 5
  definitions:
    - name: "get_menu"
      url: "https://menu.example.com/items"
      description: "List menu items"
      parameters:
        properties:
          category:
            type: string
            enum: ["drinks", "food"]
        required: ["category"]
"#,
        settings_path.display()
    );
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();
    config_path
}

#[test]
#[serial]
fn test_yaml_config_builds_app_state() {
    cleanup_env_vars();
    let dir = TempDir::new().unwrap();
    let config_path = write_files(&dir, r#"{"type": "Settings", "agent": {"think": {}}}"#);

    let config = ServerConfig::from_file(&config_path).unwrap();
    assert_eq!(config.agent_api_key(), Some("yaml-agent-key"));
    assert_eq!(config.audio_chunk_size_bytes, 1600);
    assert_eq!(config.telephony_path, "/calls");
    assert_eq!(config.max_concurrent_calls, Some(4));
    assert_eq!(config.function_call_timeout(), Some(Duration::from_secs(5)));
    assert!(!config.agent.validate_on_startup);

    let state = AppState::from_config(config).unwrap();
    assert_eq!(state.dispatcher.names(), vec!["get_menu"]);
    assert_eq!(state.agent_settings["type"], "Settings");
    assert_eq!(state.session_config().chunk_size, 1600);

    // Webhook functions are declared to the agent in the settings document
    let advertised = &state.agent_settings["agent"]["think"]["functions"];
    assert_eq!(advertised[0]["name"], "get_menu");
    assert_eq!(advertised[0]["description"], "List menu items");

    let definitions = state.dispatcher.definitions();
    assert_eq!(definitions[0]["description"], "List menu items");
    assert_eq!(
        definitions[0]["parameters"]["properties"]["category"],
        json!({"type": "string", "enum": ["drinks", "food"]})
    );
}

#[test]
#[serial]
fn test_yaml_overrides_environment() {
    cleanup_env_vars();
    unsafe {
        env::set_var("MAX_CONCURRENT_CALLS", "12");
        env::set_var("TELEPHONY_PATH", "/ignored");
    }

    let dir = TempDir::new().unwrap();
    let config_path = write_files(&dir, r#"{"type": "Settings"}"#);
    let config = ServerConfig::from_file(&config_path).unwrap();

    // YAML wins where both are set
    assert_eq!(config.telephony_path, "/calls");
    assert_eq!(config.max_concurrent_calls, Some(4));

    cleanup_env_vars();
}

#[test]
#[serial]
fn test_settings_must_be_a_json_object() {
    cleanup_env_vars();
    let dir = TempDir::new().unwrap();
    let config_path = write_files(&dir, r#"["not", "an", "object"]"#);

    let config = ServerConfig::from_file(&config_path).unwrap();
    let err = AppState::from_config(config).err().unwrap();
    assert!(err.to_string().contains("must contain a JSON object"));
}

#[test]
#[serial]
fn test_invalid_chunk_size_is_rejected() {
    cleanup_env_vars();
    unsafe {
        env::set_var("AUDIO_CHUNK_SIZE_BYTES", "100");
    }

    assert!(ServerConfig::from_env().is_err());

    cleanup_env_vars();
}
