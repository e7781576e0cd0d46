//! Event Channel Lifecycle Daemon
//!
//! Creates temporary channels for scheduled events that draw enough
//! attendance, and removes them again after the event.

mod api;
mod config;
mod gateway;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use evch_core::clock::TokioClock;
use evch_core::config::GuildConfigs;
use evch_core::events::feed_channel;
use evch_core::orchestrator::{Collaborators, LifecycleOrchestrator};
use evch_core::processors::FeedDispatcher;
use evch_core::storage::JsonFileStore;
use gateway::GatewayClient;
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Event channel lifecycle daemon
#[derive(Parser, Debug)]
#[command(name = "evch-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./evch-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the gateway bearer token
    #[arg(long, env = "EVCH_GATEWAY_TOKEN", hide_env_values = true)]
    gateway_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting evch-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(
        &args.config,
        args.listen,
        args.gateway_token,
    ));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(
        guilds = loaded_config.guilds.len(),
        "Configuration loaded from {:?}",
        args.config
    );

    let listen_addr = loaded_config.listen;
    let configs = GuildConfigs::from_configs(loaded_config.guilds)?;

    let store = JsonFileStore::open(&loaded_config.state_path)
        .await
        .map_err(|e| {
            tracing::error!(path = ?loaded_config.state_path, "Failed to open state file: {}", e);
            e
        })?;
    let gateway = Arc::new(GatewayClient::new(&loaded_config.gateway));

    let orchestrator = LifecycleOrchestrator::new(
        configs,
        Arc::new(TokioClock::new()),
        Collaborators {
            membership: gateway.clone(),
            provisioning: gateway.clone(),
            notifications: gateway.clone(),
            store: Arc::new(store),
        },
    );

    resume_guilds(&orchestrator, &gateway).await;

    // Feed dispatch
    let (feed_tx, feed_rx) = feed_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(FeedDispatcher::new(orchestrator.clone(), feed_rx, shutdown_rx).run());

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(orchestrator.clone(), config_loader);

    let router = build_router(AppState::new(orchestrator.clone(), feed_tx));

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_signal()).await;

    // Stop accepting work, then drop pending timers. Provisioned resources
    // stay persisted and are re-adopted on the next start.
    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher.await {
        tracing::error!("Feed dispatcher task failed: {}", e);
    }
    orchestrator.shutdown();
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Rebuild lifecycle state for every configured guild from the gateway's
/// current event listing.
async fn resume_guilds(orchestrator: &LifecycleOrchestrator, gateway: &GatewayClient) {
    for guild in orchestrator.configs().guilds().await {
        match gateway.scheduled_events(guild).await {
            Ok(events) => {
                tracing::info!(%guild, events = events.len(), "Resuming guild");
                orchestrator.resume(guild, events).await;
            }
            Err(e) => {
                tracing::warn!(%guild, error = %e, "Could not list scheduled events, guild not resumed");
            }
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,evch_core=debug,evch_server=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
