//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use evch_core::orchestrator::LifecycleOrchestrator;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers, waiting for Ctrl+C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the guild configuration.
///
/// Guilds whose channel naming changed get their event channels renamed.
/// Server, gateway and storage settings only take effect on restart.
///
/// Returns a Notify that can be used to stop the handler.
pub fn spawn_config_reload_handler(
    orchestrator: LifecycleOrchestrator,
    config_loader: Arc<ConfigLoader>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    reload(&orchestrator, &config_loader).await;
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}

async fn reload(orchestrator: &LifecycleOrchestrator, config_loader: &ConfigLoader) {
    let loaded = match config_loader.reload() {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to reload configuration: {}", e);
            return;
        }
    };
    let renamed = match orchestrator.configs().replace_all(loaded.guilds).await {
        Ok(renamed) => renamed,
        Err(e) => {
            tracing::error!("Failed to apply reloaded configuration: {}", e);
            return;
        }
    };
    tracing::info!(version = orchestrator.configs().version(), "Configuration reloaded successfully");

    for guild in renamed {
        orchestrator.reformat_guild(guild).await;
    }
}
