use std::path::PathBuf;

use super::utils::{env_bool, env_parse, env_string};
use super::validation;
use super::{
    AgentConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SETTINGS_PATH, DEFAULT_TELEPHONY_PATH,
    ServerConfig,
};
use crate::core::agent::{DEFAULT_AGENT_URL, DEFAULT_VALIDATION_URL};
use crate::core::audio::DEFAULT_CHUNK_SIZE;
use crate::core::session::DEFAULT_CONNECT_TIMEOUT;

/// Build a configuration from environment variables and defaults
///
/// `.env` values are already in the environment by the time this runs
/// (loaded by `dotenvy` at startup).
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let tls = validation::validate_tls_pair(env_string("TLS_CERT_PATH"), env_string("TLS_KEY_PATH"))?;

    let agent = AgentConfig {
        url: env_string("AGENT_URL").unwrap_or_else(|| DEFAULT_AGENT_URL.to_string()),
        api_key: env_string("DEEPGRAM_API_KEY"),
        settings_path: env_string("AGENT_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)),
        connect_timeout_secs: env_parse("AGENT_CONNECT_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT.as_secs()),
        receive_timeout_secs: env_parse("AGENT_RECEIVE_TIMEOUT_SECS")?,
        validate_on_startup: env_bool("AGENT_VALIDATE_ON_STARTUP")?.unwrap_or(true),
        validation_url: env_string("AGENT_VALIDATION_URL")
            .unwrap_or_else(|| DEFAULT_VALIDATION_URL.to_string()),
    };

    Ok(ServerConfig {
        host: env_string("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env_parse("PORT")?.unwrap_or(DEFAULT_PORT),
        tls,
        agent,
        audio_chunk_size_bytes: env_parse("AUDIO_CHUNK_SIZE_BYTES")?.unwrap_or(DEFAULT_CHUNK_SIZE),
        telephony_path: env_string("TELEPHONY_PATH")
            .unwrap_or_else(|| DEFAULT_TELEPHONY_PATH.to_string()),
        max_concurrent_calls: env_parse("MAX_CONCURRENT_CALLS")?,
        function_call_timeout_secs: env_parse("FUNCTION_CALL_TIMEOUT_SECS")?,
        functions: Vec::new(),
    })
}
