//! Parley server daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_server::config::ServerConfig;
use parley_server::server::{self, AppState};
use parley_store::{ChatStore, ConnectionConfig};

#[derive(Debug, Parser)]
#[command(name = "parleyd", about = "Parley messaging server", version)]
struct Cli {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind.
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path; an in-memory database is used when omitted.
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::default().with_env_overrides();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let store = match &cli.db_path {
        Some(path) => {
            info!(path = %path.display(), "opening database");
            ChatStore::open(path, &ConnectionConfig::default())
                .with_context(|| format!("failed to open database at {}", path.display()))?
        }
        None => {
            info!("no --db-path given, using an in-memory database");
            ChatStore::in_memory().context("failed to open in-memory database")?
        }
    };

    let metrics_handle = parley_server::metrics::install_recorder();
    let state = AppState::new(config, Arc::new(store), Some(metrics_handle));
    server::run(state).await
}
