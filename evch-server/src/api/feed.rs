use axum::{Json, extract::State, http::StatusCode};
use evch_sdk::objects::FeedEvent;

use crate::state::AppState;

use super::ApiError;

/// `POST /feed` - queue a feed event for the lifecycle orchestrator.
///
/// Answers `202 Accepted` once queued; processing happens asynchronously in
/// arrival order.
pub async fn submit_feed_event(
    State(state): State<AppState>,
    Json(event): Json<FeedEvent>,
) -> Result<StatusCode, ApiError> {
    tracing::debug!(guild = %event.guild_id(), ?event, "Feed event received");
    state.feed.submit(event).map_err(ApiError::Feed)?;
    Ok(StatusCode::ACCEPTED)
}
