//! Persistence of per-event resource ids.
//!
//! Only resource ids are persisted, in the layout
//! `{ guildId: { eventId: { text, voice: [..], role } } }`. Lifecycle state is
//! rebuilt from the feed on startup (see `LifecycleOrchestrator::resume`).

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use evch_sdk::objects::{EventId, GuildId, GuildState, StoredEvent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Everything stored for one guild.
    async fn load(&self, guild: GuildId) -> Result<GuildState, StoreError>;

    async fn put(
        &self,
        guild: GuildId,
        event: EventId,
        entry: StoredEvent,
    ) -> Result<(), StoreError>;

    async fn remove(&self, guild: GuildId, event: EventId) -> Result<(), StoreError>;
}
