mod config;

use clap::{Parser, Subcommand};
use config::AppConfig;
use resumer_gateway::{AuthConfig, EchoGenerator, GatewayServer};
use resumer_session::{FileEntryStore, ResponseResumer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resumer", about = "Resumable streaming responses over WebSocket")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "resumer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let (config, found) = AppConfig::load(&cli.config).await?;
    if !found {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(config, host, port).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

async fn serve(config: AppConfig, host: String, port: u16) -> anyhow::Result<()> {
    info!(host = %host, port, "Starting resumer gateway");

    let resumer = ResponseResumer::new(config.resumer.clone())?;
    if !resumer.is_enabled() {
        warn!("Response recording is disabled; resume requests will be refused");
    }
    let sweeper = resumer.spawn_sweeper();

    let entries = Arc::new(FileEntryStore::new(config.data_dir.join("entries")).await?);
    let generator = Arc::new(EchoGenerator::new(config.generator.token_delay()));

    let auth_config = AuthConfig::new(config.security.api_keys.clone());
    if auth_config.is_enabled() {
        info!(keys = config.security.api_keys.len(), "API key auth enabled");
    }

    let app = GatewayServer::build_with_middleware(resumer, generator, entries, auth_config);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Resumer gateway listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    sweeper.shutdown().await;
    Ok(())
}
