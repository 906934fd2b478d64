use std::collections::HashSet;
use std::path::PathBuf;

use url::Url;

use super::{FunctionConfig, ServerConfig, TlsConfig};
use crate::core::audio::TELEPHONY_FRAME_BYTES;

/// Paths the telephony endpoint may not shadow
const RESERVED_PATHS: [&str; 3] = ["/", "/health", "/test"];

/// Build TLS settings from an optional certificate/key pair
///
/// Both paths must be given together.
pub(super) fn validate_tls_pair(
    cert_path: Option<String>,
    key_path: Option<String>,
) -> Result<Option<TlsConfig>, String> {
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err("TLS certificate path set without a key path".to_string()),
        (None, Some(_)) => Err("TLS key path set without a certificate path".to_string()),
    }
}

/// Chunk size must be a positive whole number of telephony frames
pub(super) fn validate_chunk_size(chunk_size: usize) -> Result<(), String> {
    if chunk_size == 0 {
        return Err("Audio chunk size must be greater than zero".to_string());
    }
    if chunk_size % TELEPHONY_FRAME_BYTES != 0 {
        return Err(format!(
            "Audio chunk size {chunk_size} must be a multiple of {TELEPHONY_FRAME_BYTES} bytes"
        ));
    }
    Ok(())
}

pub(super) fn validate_timeout(name: &str, seconds: Option<u64>) -> Result<(), String> {
    match seconds {
        Some(0) => Err(format!("{name} must be greater than zero")),
        _ => Ok(()),
    }
}

pub(super) fn validate_telephony_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("Telephony path must start with '/': {path}"));
    }
    if RESERVED_PATHS.contains(&path) {
        return Err(format!("Telephony path {path} is reserved"));
    }
    Ok(())
}

pub(super) fn validate_agent_url(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("Invalid agent URL {url}: {e}"))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        scheme => Err(format!(
            "Agent URL must use ws or wss, got {scheme}: {url}"
        )),
    }
}

pub(super) fn validate_http_url(what: &str, url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("Invalid {what} URL {url}: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(format!(
            "{what} URL must use http or https, got {scheme}: {url}"
        )),
    }
}

/// Function names must be unique and non-empty; webhook URLs must be HTTP(S)
pub(super) fn validate_functions(functions: &[FunctionConfig]) -> Result<(), String> {
    let mut seen = HashSet::new();

    for function in functions {
        let name = function.name.trim();
        if name.is_empty() {
            return Err("Function definitions require a non-empty name".to_string());
        }
        if !seen.insert(name) {
            return Err(format!("Duplicate function name: {name}"));
        }
        validate_http_url(&format!("function '{name}'"), &function.url)?;
        validate_timeout(
            &format!("Timeout for function '{name}'"),
            function.timeout_secs,
        )?;
    }

    Ok(())
}

/// Validate a fully merged configuration
pub(super) fn validate_config(config: &ServerConfig) -> Result<(), String> {
    validate_agent_url(&config.agent.url)?;
    validate_http_url("validation", &config.agent.validation_url)?;
    validate_timeout(
        "Agent connect timeout",
        Some(config.agent.connect_timeout_secs),
    )?;
    validate_timeout("Agent receive timeout", config.agent.receive_timeout_secs)?;
    validate_chunk_size(config.audio_chunk_size_bytes)?;
    validate_telephony_path(&config.telephony_path)?;
    if config.max_concurrent_calls == Some(0) {
        return Err("Maximum concurrent calls must be greater than zero".to_string());
    }
    validate_timeout("Function call timeout", config.function_call_timeout_secs)?;
    validate_functions(&config.functions)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::functions::ParameterSchema;
    use std::collections::HashMap;

    fn function(name: &str, url: &str) -> FunctionConfig {
        FunctionConfig {
            name: name.to_string(),
            url: url.to_string(),
            description: None,
            parameters: ParameterSchema::default(),
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }

    #[test]
    fn test_tls_pair() {
        assert!(validate_tls_pair(None, None).unwrap().is_none());
        let tls = validate_tls_pair(Some("c.pem".into()), Some("k.pem".into()))
            .unwrap()
            .unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("c.pem"));
        assert!(validate_tls_pair(Some("c.pem".into()), None).is_err());
        assert!(validate_tls_pair(None, Some("k.pem".into())).is_err());
    }

    #[test]
    fn test_chunk_size() {
        assert!(validate_chunk_size(3200).is_ok());
        assert!(validate_chunk_size(160).is_ok());
        assert!(validate_chunk_size(0).is_err());
        assert!(
            validate_chunk_size(3000)
                .unwrap_err()
                .contains("multiple of 160")
        );
    }

    #[test]
    fn test_timeouts() {
        assert!(validate_timeout("x", None).is_ok());
        assert!(validate_timeout("x", Some(3)).is_ok());
        assert_eq!(
            validate_timeout("Agent connect timeout", Some(0)).unwrap_err(),
            "Agent connect timeout must be greater than zero"
        );
    }

    #[test]
    fn test_telephony_path() {
        assert!(validate_telephony_path("/twilio").is_ok());
        assert!(validate_telephony_path("twilio").is_err());
        assert!(validate_telephony_path("/health").is_err());
        assert!(validate_telephony_path("/").is_err());
    }

    #[test]
    fn test_agent_url() {
        assert!(validate_agent_url("wss://agent.deepgram.com/v1/agent/converse").is_ok());
        assert!(validate_agent_url("ws://localhost:9000").is_ok());
        assert!(validate_agent_url("https://agent.example.com").is_err());
        assert!(validate_agent_url("nope").is_err());
    }

    #[test]
    fn test_functions() {
        assert!(
            validate_functions(&[
                function("get_menu", "https://menu.example.com"),
                function("place_order", "http://localhost:8080/order"),
            ])
            .is_ok()
        );

        assert!(
            validate_functions(&[
                function("dup", "https://a.example.com"),
                function("dup", "https://b.example.com"),
            ])
            .unwrap_err()
            .contains("Duplicate function name")
        );

        assert!(validate_functions(&[function("  ", "https://a.example.com")]).is_err());
        assert!(validate_functions(&[function("f", "ftp://a.example.com")]).is_err());
        assert!(validate_functions(&[function("f", "not a url")]).is_err());
    }
}
