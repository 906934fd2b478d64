use std::path::PathBuf;

use super::env::load_from_env;
use super::validation;
use super::yaml::YamlConfig;
use super::{FunctionConfig, ServerConfig};

/// Merge environment configuration (base) with YAML overrides
///
/// Any value present in the YAML file replaces the environment value.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            let (env_cert, env_key) = match config.tls.take() {
                Some(existing) => (
                    Some(existing.cert_path.display().to_string()),
                    Some(existing.key_path.display().to_string()),
                ),
                None => (None, None),
            };
            config.tls = validation::validate_tls_pair(
                tls.cert_path.or(env_cert),
                tls.key_path.or(env_key),
            )?;
        }
    }

    if let Some(agent) = yaml.agent {
        if let Some(url) = agent.url {
            config.agent.url = url;
        }
        if let Some(api_key) = agent.api_key {
            config.agent.api_key = Some(api_key);
        }
        if let Some(settings_path) = agent.settings_path {
            config.agent.settings_path = PathBuf::from(settings_path);
        }
        if let Some(seconds) = agent.connect_timeout_secs {
            config.agent.connect_timeout_secs = seconds;
        }
        if let Some(seconds) = agent.receive_timeout_secs {
            config.agent.receive_timeout_secs = Some(seconds);
        }
        if let Some(validate) = agent.validate_on_startup {
            config.agent.validate_on_startup = validate;
        }
        if let Some(url) = agent.validation_url {
            config.agent.validation_url = url;
        }
    }

    if let Some(chunk_size) = yaml.audio.and_then(|audio| audio.chunk_size_bytes) {
        config.audio_chunk_size_bytes = chunk_size;
    }

    if let Some(telephony) = yaml.telephony {
        if let Some(path) = telephony.path {
            config.telephony_path = path;
        }
        if let Some(limit) = telephony.max_concurrent_calls {
            config.max_concurrent_calls = Some(limit);
        }
    }

    if let Some(functions) = yaml.functions {
        if let Some(seconds) = functions.call_timeout_secs {
            config.function_call_timeout_secs = Some(seconds);
        }
        config.functions = functions
            .definitions
            .into_iter()
            .map(|definition| FunctionConfig {
                name: definition.name,
                url: definition.url,
                description: definition.description,
                parameters: definition.parameters.unwrap_or_default(),
                headers: definition.headers,
                timeout_secs: definition.timeout_secs,
            })
            .collect();
    }

    Ok(config)
}
