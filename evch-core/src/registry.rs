//! Per-event lifecycle records.
//!
//! Every record sits behind its own async mutex. [`EventRegistry::with_lock`]
//! is the only way to read-modify-write a record: it holds the mutex for the
//! duration of the closure and for persisting the result, which is what keeps
//! two racing handlers of the same event from both provisioning.

use crate::storage::ResourceStore;
use evch_sdk::objects::{ChannelId, EventId, GuildId, RoleId, StoredEvent};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use tracing::{debug, error};

/// Identifies an event within its guild scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventKey {
    pub guild: GuildId,
    pub event: EventId,
}

impl EventKey {
    pub const fn new(guild: GuildId, event: EventId) -> Self {
        Self { guild, event }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.guild, self.event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "checkpoint", rename_all = "snake_case")]
pub enum LifecycleState {
    Scheduled,
    /// Waiting for, or evaluating, attendance checkpoint `n`.
    AttendanceRetry(u32),
    Provisioning,
    Provisioned,
    Started,
    Warned,
    Cleanup,
    Abandoned,
    Removed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Abandoned | LifecycleState::Removed)
    }

    /// States in which the event holds resources.
    pub fn holds_resources(self) -> bool {
        matches!(
            self,
            LifecycleState::Provisioned | LifecycleState::Started | LifecycleState::Warned
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::AttendanceRetry(n) => write!(f, "attendance_retry({n})"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// Channels created for an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResources {
    pub text: Option<ChannelId>,
    #[serde(default)]
    pub voice: SmallVec<[ChannelId; 4]>,
    /// Divider the event role was granted access to. Shared by the guild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divider: Option<ChannelId>,
}

impl EventResources {
    /// Whether the event owns no channel. The shared divider does not count.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.voice.is_empty()
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.text == Some(channel) || self.voice.contains(&channel)
    }

    /// Forget a channel deleted elsewhere. Returns whether it was ours.
    pub fn forget(&mut self, channel: ChannelId) -> bool {
        let mut found = false;
        if self.text == Some(channel) {
            self.text = None;
            found = true;
        }
        let before = self.voice.len();
        self.voice.retain(|id| *id != channel);
        found || self.voice.len() != before
    }
}

/// Lifecycle record of one tracked event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub key: EventKey,
    pub name: String,
    pub role_id: Option<RoleId>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub delete_at: OffsetDateTime,
    pub state: LifecycleState,
    pub retry_count: u32,
    pub resources: EventResources,
    /// Bumped whenever attendance checks start over.
    #[serde(skip)]
    pub generation: u32,
}

impl EventRecord {
    pub fn new(
        key: EventKey,
        name: impl Into<String>,
        start_time: OffsetDateTime,
        delete_at: OffsetDateTime,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            role_id: None,
            start_time,
            delete_at,
            state: LifecycleState::Scheduled,
            retry_count: 0,
            resources: EventResources::default(),
            generation: 0,
        }
    }

    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    /// The persisted form, `None` when there is nothing worth persisting.
    fn stored(&self) -> Option<StoredEvent> {
        self.has_resources().then(|| StoredEvent {
            text: self.resources.text,
            voice: self.resources.voice.clone(),
            role: self.role_id,
        })
    }
}

type EventSlot = tokio::sync::Mutex<Option<EventRecord>>;

/// Owns every tracked [`EventRecord`] and its mutex.
pub struct EventRegistry {
    slots: Mutex<HashMap<EventKey, Arc<EventSlot>>>,
    store: Arc<dyn ResourceStore>,
}

impl EventRegistry {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<EventKey, Arc<EventSlot>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, key: EventKey) -> Option<Arc<EventSlot>> {
        self.slots().get(&key).cloned()
    }

    fn drop_slot(&self, key: EventKey, slot: &Arc<EventSlot>) {
        let mut slots = self.slots();
        if slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(&key);
        }
    }

    /// Start tracking a record. Returns `false` if the event is already tracked.
    pub async fn register(&self, record: EventRecord) -> bool {
        let key = record.key;
        let stored = record.stored();
        let slot = Arc::new(EventSlot::new(Some(record)));
        // Held until the record is persisted. The mutex is fresh, so this
        // cannot fail.
        let _guard = Arc::clone(&slot).try_lock_owned().ok();
        {
            let mut slots = self.slots();
            if slots.contains_key(&key) {
                return false;
            }
            slots.insert(key, slot);
        }
        if let Some(entry) = stored {
            self.persist(key, Some(entry)).await;
        }
        true
    }

    /// A copy of the current record.
    pub async fn get(&self, key: EventKey) -> Option<EventRecord> {
        let slot = self.slot(key)?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Stop tracking an event, returning its last record.
    pub async fn remove(&self, key: EventKey) -> Option<EventRecord> {
        let slot = self.slot(key)?;
        let mut guard = slot.lock().await;
        let record = guard.take();
        self.drop_slot(key, &slot);
        if record.as_ref().is_some_and(EventRecord::has_resources) {
            self.persist(key, None).await;
        }
        record
    }

    /// Run `f` on the record under the event's mutex and persist the result.
    ///
    /// Returns `None` if the event is not tracked. A record left in a terminal
    /// state is removed before the mutex is released, so later handlers see
    /// the event as untracked.
    pub async fn with_lock<T, F>(&self, key: EventKey, f: F) -> Option<T>
    where
        F: FnOnce(&mut EventRecord) -> T,
    {
        let slot = self.slot(key)?;
        let mut guard = slot.lock().await;
        let record = guard.as_mut()?;

        let before = record.stored();
        let output = f(record);
        let after = record.stored();
        let terminal = record.state.is_terminal();

        if before != after {
            self.persist(key, after).await;
        }
        if terminal {
            debug!(%key, state = %record.state, "Record reached a terminal state");
            guard.take();
            self.drop_slot(key, &slot);
        }
        Some(output)
    }

    /// Idempotency guard consulted before provisioning.
    pub async fn has_resources(&self, key: EventKey) -> bool {
        self.with_lock(key, |record| record.has_resources())
            .await
            .unwrap_or(false)
    }

    /// Number of tracked events across all guilds.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    /// Number of guilds with at least one tracked event.
    pub fn guild_count(&self) -> usize {
        self.slots().keys().map(|key| key.guild).unique().count()
    }

    /// Keys of every tracked event of a guild.
    pub fn keys(&self, guild: GuildId) -> Vec<EventKey> {
        self.slots()
            .keys()
            .filter(|key| key.guild == guild)
            .copied()
            .sorted()
            .collect()
    }

    /// Copies of every tracked record of a guild.
    pub async fn records(&self, guild: GuildId) -> Vec<EventRecord> {
        let mut records = Vec::new();
        for key in self.keys(guild) {
            if let Some(record) = self.get(key).await {
                records.push(record);
            }
        }
        records
    }

    /// The event owning `channel`, if any.
    pub async fn find_by_channel(&self, guild: GuildId, channel: ChannelId) -> Option<EventKey> {
        for record in self.records(guild).await {
            if record.resources.contains(channel) {
                return Some(record.key);
            }
        }
        None
    }

    /// Events whose resolved role is `role`.
    pub async fn find_by_role(&self, guild: GuildId, role: RoleId) -> Vec<EventKey> {
        self.records(guild)
            .await
            .into_iter()
            .filter(|record| record.role_id == Some(role))
            .map(|record| record.key)
            .collect()
    }

    /// Whether the guild's divider is still needed: some event holds
    /// resources or is in the middle of creating them.
    pub async fn guild_uses_divider(&self, guild: GuildId) -> bool {
        self.records(guild).await.iter().any(|record| {
            record.has_resources() || record.state == LifecycleState::Provisioning
        })
    }

    async fn persist(&self, key: EventKey, entry: Option<StoredEvent>) {
        let result = match entry {
            Some(entry) => self.store.put(key.guild, key.event, entry).await,
            None => self.store.remove(key.guild, key.event).await,
        };
        if let Err(e) = result {
            error!(%key, error = %e, "Failed to persist event resources");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use smallvec::smallvec;
    use time::macros::datetime;

    fn key(event: u64) -> EventKey {
        EventKey::new(GuildId(1), EventId(event))
    }

    fn record(event: u64) -> EventRecord {
        EventRecord::new(
            key(event),
            "Raid",
            datetime!(2025-06-01 18:00 UTC),
            datetime!(2025-06-01 22:00 UTC),
        )
    }

    fn registry() -> (EventRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (EventRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn register_is_first_writer_wins() {
        let (registry, _) = registry();
        assert!(registry.register(record(1)).await);
        assert!(!registry.register(record(1)).await);
        assert_eq!(registry.keys(GuildId(1)), vec![key(1)]);
    }

    #[tokio::test]
    async fn with_lock_persists_resources_and_clears_them() {
        let (registry, store) = registry();
        registry.register(record(1)).await;

        registry
            .with_lock(key(1), |r| {
                r.state = LifecycleState::Provisioned;
                r.role_id = Some(RoleId(5));
                r.resources.text = Some(ChannelId(10));
                r.resources.voice = smallvec![ChannelId(11)];
            })
            .await;
        assert!(registry.has_resources(key(1)).await);
        let stored = &store.snapshot()[&GuildId(1)][&EventId(1)];
        assert_eq!(stored.voice.as_slice(), &[ChannelId(11)]);
        assert_eq!(stored.role, Some(RoleId(5)));

        registry
            .with_lock(key(1), |r| {
                r.resources = EventResources::default();
                r.state = LifecycleState::Cleanup;
            })
            .await;
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn terminal_state_untracks_the_event() {
        let (registry, _) = registry();
        registry.register(record(1)).await;
        let out = registry
            .with_lock(key(1), |r| {
                r.state = LifecycleState::Abandoned;
                7
            })
            .await;
        assert_eq!(out, Some(7));
        assert!(registry.get(key(1)).await.is_none());
        assert_eq!(registry.with_lock(key(1), |_| ()).await, None);

        // A fresh observation may track it again.
        assert!(registry.register(record(1)).await);
    }

    #[tokio::test]
    async fn lookups_by_channel_and_role() {
        let (registry, _) = registry();
        registry.register(record(1)).await;
        registry.register(record(2)).await;
        registry
            .with_lock(key(2), |r| {
                r.role_id = Some(RoleId(9));
                r.resources.voice = smallvec![ChannelId(20), ChannelId(21)];
                r.state = LifecycleState::Provisioned;
            })
            .await;

        assert_eq!(
            registry.find_by_channel(GuildId(1), ChannelId(21)).await,
            Some(key(2))
        );
        assert_eq!(registry.find_by_channel(GuildId(1), ChannelId(1)).await, None);
        assert_eq!(registry.find_by_role(GuildId(1), RoleId(9)).await, vec![key(2)]);
        assert!(registry.guild_uses_divider(GuildId(1)).await);
        assert!(!registry.guild_uses_divider(GuildId(2)).await);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.guild_count(), 1);
    }

    #[tokio::test]
    async fn provisioning_event_keeps_the_divider_in_use() {
        let (registry, _) = registry();
        assert!(registry.is_empty());
        registry.register(record(1)).await;
        assert!(!registry.guild_uses_divider(GuildId(1)).await);

        registry
            .with_lock(key(1), |r| r.state = LifecycleState::Provisioning)
            .await;
        assert!(registry.guild_uses_divider(GuildId(1)).await);
    }

    #[test]
    fn forgetting_channels() {
        let mut resources = EventResources {
            text: Some(ChannelId(1)),
            voice: smallvec![ChannelId(2), ChannelId(3)],
            divider: Some(ChannelId(9)),
        };
        assert!(!resources.forget(ChannelId(9)));
        assert!(resources.forget(ChannelId(1)));
        assert!(resources.forget(ChannelId(2)));
        assert!(!resources.is_empty());
        assert!(resources.forget(ChannelId(3)));
        assert!(resources.is_empty());
    }
}
