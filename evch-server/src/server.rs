//! Axum server setup and router configuration.

use crate::api;
use crate::state::AppState;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .nest("/v1", api::router())
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    tracked_events: usize,
    tracked_guilds: usize,
    configured_guilds: usize,
    config_version: u64,
}

/// Liveness plus a summary of what the lifecycle engine is tracking.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let registry = orchestrator.registry();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tracked_events: registry.len(),
        tracked_guilds: registry.guild_count(),
        configured_guilds: orchestrator.configs().guilds().await.len(),
        config_version: orchestrator.configs().version(),
    })
}

/// Run the server until `shutdown` completes.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
