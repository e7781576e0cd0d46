pub mod event;
pub mod feed;
pub mod ids;
pub mod stored;

pub use event::{EventStatus, ScheduledEvent};
pub use feed::FeedEvent;
pub use ids::{ChannelId, EventId, GuildId, RoleId};
pub use stored::{GuildState, StateDocument, StoredEvent};
