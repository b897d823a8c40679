//! Session server binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use collab_server::config::Config;
use collab_server::server;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "collab_server=info,collab_core=info";

#[derive(Parser)]
#[clap(name = "collab-server")]
#[clap(about = "Real-time collaborative room server (JSON over TCP lines and WebSocket)")]
struct Cli {
    /// TOML config file (overrides COLLAB_CONFIG)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind
    #[clap(long)]
    bind: Option<String>,

    /// TCP port
    #[clap(short, long)]
    port: Option<u16>,

    /// Maximum simultaneous connections
    #[clap(long)]
    max_clients: Option<usize>,

    /// Minimum ms between document broadcasts per room (0 disables)
    #[clap(long)]
    broadcast_interval_ms: Option<u64>,

    /// Seconds an empty room is kept before eviction (0 keeps forever)
    #[clap(long)]
    room_idle_secs: Option<u64>,

    /// Largest accepted inbound frame in bytes
    #[clap(long)]
    max_frame_bytes: Option<usize>,

    /// Log filter, e.g. "debug" or "collab_server=trace" (replaces RUST_LOG)
    #[clap(short, long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max) = self.max_clients {
            config.max_clients = max;
        }
        if let Some(ms) = self.broadcast_interval_ms {
            config.broadcast_interval_ms = ms;
        }
        if let Some(secs) = self.room_idle_secs {
            config.room_idle_secs = secs;
        }
        if let Some(bytes) = self.max_frame_bytes {
            config.max_frame_bytes = bytes;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    info!(
        "Starting collab-server on {} (max_clients = {})",
        config.socket_addr_string(),
        config.max_clients
    );

    server::run(config).await
}
