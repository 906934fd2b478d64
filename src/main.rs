use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use callbridge_gateway::{
    ServerConfig, core::agent::validate_api_key, routes, state::AppState,
};

/// CallBridge Gateway - telephony to voice-agent relay
#[derive(Parser, Debug)]
#[command(name = "callbridge-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the agent API key against the provider and exit
    ValidateKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading any configuration
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    if let Some(Commands::ValidateKey) = cli.command {
        check_api_key(&config).await?;
        println!("Agent API key is valid");
        return Ok(());
    }

    if config.agent.validate_on_startup {
        check_api_key(&config).await?;
        info!("Agent API key validated");
    }

    let address = config.address();
    let tls_config = config.tls.clone();
    let telephony_path = config.telephony_path.clone();

    let app_state = AppState::from_config(config).map_err(|e| anyhow!(e.to_string()))?;
    let app = routes::create_app(app_state);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    if let Some(tls) = tls_config {
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to load TLS certificates from {} and {}: {}",
                    tls.cert_path.display(),
                    tls.key_path.display(),
                    e
                )
            })?;

        info!(path = %telephony_path, "Server listening on https://{} (TLS enabled)", socket_addr);

        axum_server::bind_rustls(socket_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow!("TLS server error: {}", e))?;
    } else {
        info!(path = %telephony_path, "Server listening on http://{}", socket_addr);

        let listener = TcpListener::bind(&socket_addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}

async fn check_api_key(config: &ServerConfig) -> anyhow::Result<()> {
    let api_key = config
        .agent_api_key()
        .ok_or_else(|| anyhow!("DEEPGRAM_API_KEY (or agent.api_key) is not set"))?;

    let client = reqwest::Client::new();
    validate_api_key(&client, &config.agent.validation_url, api_key)
        .await
        .map_err(|e| {
            error!("Agent API key validation failed: {}", e);
            anyhow!(e)
        })
}
