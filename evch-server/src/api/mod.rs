//! HTTP API handlers.
//!
//! # Endpoints
//!
//! - `POST /feed`                                  – submit a feed event
//! - `POST /guilds/{guild}/events/{event}/extend` – postpone resource deletion
//! - `GET  /guilds/{guild}/events`                – list tracked events
//! - `PUT  /guilds/{guild}/config`                – replace a guild's configuration

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use evch_core::config::GuildConfigError;
use evch_core::events::FeedError;

use crate::state::AppState;

mod feed;
mod guilds;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed", post(feed::submit_feed_event))
        .route(
            "/guilds/{guild}/events/{event}/extend",
            post(guilds::extend_deletion),
        )
        .route("/guilds/{guild}/events", get(guilds::list_events))
        .route("/guilds/{guild}/config", put(guilds::put_config))
}

pub(crate) enum ApiError {
    Feed(FeedError),
    InvalidConfig(GuildConfigError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Feed(e) => {
                tracing::warn!(error = %e, "Feed event not accepted");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            ApiError::InvalidConfig(e) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response()
            }
        }
    }
}
