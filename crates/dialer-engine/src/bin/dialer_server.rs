//! Dialer Server
//!
//! Serves the call list HTTP API over a SQLite database:
//! 1. Loads layered configuration (defaults, optional TOML file, environment)
//! 2. Optionally seeds the predefined lists and dispositions
//! 3. Refreshes dynamic lists on the configured interval

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use dialer_engine::config::DialerConfig;
use dialer_engine::server::{init_tracing, DialerServer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Outbound dialer call list server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API bind address (e.g. 0.0.0.0:8090)
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the database URL (e.g. sqlite://dialer.db)
    #[arg(long)]
    database_url: Option<String>,

    /// Override the dynamic refresh interval in seconds (0 disables it)
    #[arg(long)]
    refresh_interval: Option<u64>,

    /// Insert the predefined lists and dispositions before serving
    #[arg(long)]
    seed: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = DialerConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.api.bind_address = bind;
    }
    if let Some(url) = args.database_url {
        config.database.database_url = url;
    }
    if let Some(secs) = args.refresh_interval {
        config.population.refresh_interval_secs = secs;
    }
    if args.json_logs {
        config.logging.json = true;
    }
    config.validate()?;

    init_tracing(&config.logging)?;
    info!("Starting dialer-server v{}", env!("CARGO_PKG_VERSION"));

    let mut server = DialerServer::new(config).await?;
    if args.seed {
        server.seed().await?;
    }

    server.serve().await
}
