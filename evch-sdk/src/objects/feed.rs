//! Payloads delivered by the source-of-truth feed and the manual-deletion
//! observers.

use super::event::ScheduledEvent;
use super::ids::{ChannelId, EventId, GuildId, RoleId};
use serde::{Deserialize, Serialize};

/// One observation from the outside world.
///
/// Feed events are idempotent: they carry the latest known state (or just
/// an identifier) and the lifecycle re-derives everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A scheduled event was created.
    Created { event: ScheduledEvent },
    /// A scheduled event changed (name, start time or status).
    Updated { event: ScheduledEvent },
    /// A scheduled event was deleted at the source.
    Deleted { guild_id: GuildId, event_id: EventId },
    /// A channel was deleted by someone other than this daemon.
    ChannelDeleted {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
    /// A role was deleted by someone other than this daemon.
    RoleDeleted { guild_id: GuildId, role_id: RoleId },
}

impl FeedEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            FeedEvent::Created { event } | FeedEvent::Updated { event } => event.guild_id,
            FeedEvent::Deleted { guild_id, .. }
            | FeedEvent::ChannelDeleted { guild_id, .. }
            | FeedEvent::RoleDeleted { guild_id, .. } => *guild_id,
        }
    }
}
