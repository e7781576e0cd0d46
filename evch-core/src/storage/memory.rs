use super::{ResourceStore, StoreError};
use async_trait::async_trait;
use evch_sdk::objects::{EventId, GuildId, GuildState, StateDocument, StoredEvent};
use std::sync::Mutex;

/// Volatile store, used when no state file is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<StateDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: StateDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    pub fn snapshot(&self) -> StateDocument {
        self.document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn load(&self, guild: GuildId) -> Result<GuildState, StoreError> {
        Ok(self.snapshot().remove(&guild).unwrap_or_default())
    }

    async fn put(
        &self,
        guild: GuildId,
        event: EventId,
        entry: StoredEvent,
    ) -> Result<(), StoreError> {
        let mut document = self.document.lock().unwrap_or_else(|e| e.into_inner());
        document.entry(guild).or_default().insert(event, entry);
        Ok(())
    }

    async fn remove(&self, guild: GuildId, event: EventId) -> Result<(), StoreError> {
        let mut document = self.document.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = document.get_mut(&guild) {
            state.remove(&event);
            if state.is_empty() {
                document.remove(&guild);
            }
        }
        Ok(())
    }
}
