use super::ids::{EventId, GuildId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Status of a scheduled event as reported by the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl EventStatus {
    /// Whether the event is gone from the lifecycle's point of view.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Cancelled)
    }
}

/// A scheduled event as observed on the source-of-truth feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: EventId,
    pub guild_id: GuildId,
    /// Raw event title.
    pub name: String,
    /// Absolute start time, carried as unix seconds on the wire.
    #[serde(with = "time::serde::timestamp")]
    pub start_time: OffsetDateTime,
    pub status: EventStatus,
}
