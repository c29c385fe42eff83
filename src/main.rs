//! SweetFlips service binary.

use clap::Parser;
use sweetflips_core::{
    api::ApiServer,
    config::ConfigLoader,
    ledger::{Ledger, SuspicionThresholds},
    service::{RoundService, StakeLimits},
    session::SessionStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sweetflips", about = "SweetFlips game and ledger service")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override the listen address
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sweetflips_core=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(listen) = cli.listen {
        config.server.listen_address = listen;
    }

    info!("Opening ledger at {}", config.ledger.database_path);
    let ledger = Arc::new(
        Ledger::open(&config.ledger.database_path)?.with_thresholds(SuspicionThresholds {
            large_convert_cents: config.ledger.large_convert_cents,
            ..SuspicionThresholds::default()
        }),
    );

    let sessions = Arc::new(SessionStore::with_ttl(Duration::from_secs(
        config.game.session_ttl_secs,
    )));
    SessionStore::spawn_sweeper(
        sessions.clone(),
        Duration::from_secs(config.game.sweep_interval_secs),
    );

    let service = Arc::new(
        RoundService::new(ledger, sessions).with_limits(StakeLimits {
            min: config.game.min_stake_cents,
            max: config.game.max_stake_cents,
        }),
    );

    ApiServer::new(config, service).run().await
}
