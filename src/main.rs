use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use slipway::config::ServerConfig;
use slipway::server;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(version, about = "Minimal self-hosted deployment orchestrator")]
struct Cli {
    /// Dashboard port (falls back to the PORT env var, then slipway.toml)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory that holds cloned project working directories
    #[arg(long)]
    deployments_dir: Option<PathBuf>,

    /// Base URL used to derive each project's public URL
    #[arg(long)]
    public_url: Option<String>,

    /// First port handed to deployed projects
    #[arg(long)]
    base_port: Option<u16>,

    /// Path to the configuration file
    #[arg(long, default_value = "slipway.toml")]
    config: PathBuf,

    /// Enable dev mode (bind all interfaces, permissive CORS)
    #[arg(long)]
    dev: bool,

    /// Auto-open browser after the server starts
    #[arg(long)]
    open: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slipway=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load(&cli.config).context("Failed to load configuration")?;
    if let Some(port) = cli.port.or_else(env_port) {
        config.port = port;
    }
    if let Some(dir) = cli.deployments_dir {
        config.deployments_dir = dir;
    }
    if let Some(url) = cli.public_url {
        config.public_base_url = Some(url);
    }
    if let Some(base) = cli.base_port {
        config.base_port = base;
    }
    config.dev_mode |= cli.dev;

    server::start_server(config, cli.open).await
}

fn env_port() -> Option<u16> {
    std::env::var("PORT").ok()?.parse().ok()
}
