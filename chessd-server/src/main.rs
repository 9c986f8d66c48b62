//! `chessd` binary: parses CLI configuration, wires the component graph,
//! and runs the orchestrator until a shutdown signal arrives.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use chessd_server::collaborators::{EloRatingUpdater, InMemoryAccountStore, InMemoryHistoryStore};
use chessd_server::matchmaker::{Matchmaker, MatchmakerConfig};
use chessd_server::orchestrator::{self, AppState, OrchestratorConfig};

/// A server-authoritative multiplayer chess platform.
#[derive(Debug, Parser)]
#[command(name = "chessd", version, about)]
struct Cli {
    /// Address to accept connections on.
    #[arg(long, default_value = "0.0.0.0:7878")]
    listen_addr: SocketAddr,

    /// Tracing filter, e.g. "info" or "chessd_server=debug".
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Clock-tick cadence, in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// How often the matchmaking queue is swept, in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    matchmaking_ms: u64,

    /// Rating band, in Elo points, for an immediate human pairing.
    #[arg(long, default_value_t = 200)]
    rating_band: i32,

    /// Seconds a ticket waits before its rating band is relaxed.
    #[arg(long, default_value_t = 30)]
    relax_after_secs: u64,

    /// Seconds a ticket waits without a human match before falling back to a bot.
    #[arg(long, default_value_t = 60)]
    bot_fallback_secs: u64,

    /// K-factor for the Elo rating update.
    #[arg(long, default_value_t = 32.0)]
    elo_k_factor: f64,

    /// Seconds a disconnected player has to reconnect before their session
    /// is abandoned. 0 (the default) abandons immediately on disconnect.
    #[arg(long, default_value_t = 0)]
    reconnect_grace_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matchmaker_config = MatchmakerConfig {
        band: cli.rating_band,
        relax_after: Duration::from_secs(cli.relax_after_secs),
        bot_fallback: Duration::from_secs(cli.bot_fallback_secs),
    };
    let state = AppState::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryHistoryStore::new()),
        Arc::new(EloRatingUpdater::new(cli.elo_k_factor)),
        Matchmaker::new(matchmaker_config),
    )
    .with_reconnect_grace(Duration::from_secs(cli.reconnect_grace_secs));

    let config = OrchestratorConfig {
        listen_addr: cli.listen_addr,
        tick_interval: Duration::from_millis(cli.tick_ms),
        matchmaking_interval: Duration::from_millis(cli.matchmaking_ms),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    match orchestrator::run(state, config, shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "orchestrator exited with an error");
            ExitCode::FAILURE
        }
    }
}

