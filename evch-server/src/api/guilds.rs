use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use evch_core::config::naming_changed;
use evch_core::orchestrator::{ExtendDeletion, ListGuildEvents};
use evch_core::registry::EventKey;
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::{EventId, GuildId};
use kanau::processor::Processor;
use serde::Serialize;

use crate::state::AppState;

use super::ApiError;

#[derive(Serialize)]
struct ExtendResponse {
    extended: bool,
}

/// `POST /guilds/{guild}/events/{event}/extend` - postpone deletion.
///
/// `extended` is `false` when the event has not started or is not tracked.
pub async fn extend_deletion(
    State(state): State<AppState>,
    Path((guild, event)): Path<(GuildId, EventId)>,
) -> impl IntoResponse {
    let key = EventKey::new(guild, event);
    let Ok(extended) = state.orchestrator.process(ExtendDeletion { key }).await;
    Json(ExtendResponse { extended })
}

/// `GET /guilds/{guild}/events` - every tracked record of a guild.
pub async fn list_events(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> impl IntoResponse {
    let Ok(records) = state.orchestrator.process(ListGuildEvents { guild }).await;
    Json(records)
}

/// `PUT /guilds/{guild}/config` - validate and apply a guild configuration.
///
/// Channels of provisioned events are renamed in the background when the
/// naming settings changed.
pub async fn put_config(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(config): Json<GuildConfig>,
) -> Result<StatusCode, ApiError> {
    let configs = state.orchestrator.configs();
    let previous = configs
        .upsert(guild, config.clone())
        .await
        .map_err(ApiError::InvalidConfig)?;
    tracing::info!(%guild, "Guild configuration updated");

    if naming_changed(&previous, &config) {
        let orchestrator = state.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.reformat_guild(guild).await;
        });
    }
    Ok(StatusCode::NO_CONTENT)
}
