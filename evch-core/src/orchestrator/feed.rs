//! Reactions to the source-of-truth feed and manual deletions.

use super::LifecycleOrchestrator;
use crate::naming::NameFormatter;
use crate::registry::{EventKey, EventRecord, EventResources, LifecycleState};
use crate::scheduler::TaskKind;
use crate::utils::timing;
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::{
    ChannelId, EventId, EventStatus, GuildId, GuildState, RoleId, ScheduledEvent, StoredEvent,
};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// What an update requires of the task chain.
enum Reschedule {
    Keep,
    /// Not provisioned yet: start over from the creation checkpoint.
    Restart,
    /// Provisioned: move the next chain task.
    Chain(TaskKind, OffsetDateTime),
}

impl LifecycleOrchestrator {
    /// Start tracking a newly observed event.
    pub async fn on_created(&self, event: ScheduledEvent) {
        let key = EventKey::new(event.guild_id, event.id);
        if event.status != EventStatus::Scheduled {
            debug!(%key, status = ?event.status, "Ignoring event that is not scheduled");
            return;
        }
        let config = self.inner.configs.get(key.guild).await;
        let record = EventRecord::new(
            key,
            event.name.as_str(),
            event.start_time,
            timing::delete_time(event.start_time, config.deletion_hours),
        );
        if !self.inner.registry.register(record).await {
            debug!(%key, "Event already tracked");
            return;
        }
        let fire_at = timing::creation_time(event.start_time, &config);
        info!(%key, name = %event.name, start = %event.start_time, %fire_at, "Tracking event");
        self.schedule(key, TaskKind::Main, fire_at);
    }

    pub async fn on_updated(&self, event: ScheduledEvent) {
        let key = EventKey::new(event.guild_id, event.id);
        if event.status.is_terminal() {
            info!(%key, status = ?event.status, "Event ended at the source");
            self.on_deleted(key).await;
            return;
        }
        let Some(current) = self.inner.registry.get(key).await else {
            if event.status == EventStatus::Scheduled {
                self.on_created(event).await;
            }
            return;
        };
        let name_changed = current.name != event.name;
        let time_changed = current.start_time != event.start_time;
        if !name_changed && !time_changed {
            return;
        }

        let config = self.inner.configs.get(key.guild).await;
        let delete_at = timing::delete_time(event.start_time, config.deletion_hours);
        let updated = self
            .inner
            .registry
            .with_lock(key, |record| {
                record.name = event.name.clone();
                record.start_time = event.start_time;
                record.delete_at = delete_at;
                let plan = match record.state {
                    LifecycleState::Scheduled | LifecycleState::AttendanceRetry(_) => {
                        // The role name embeds both the name and the start time.
                        record.role_id = None;
                        if time_changed {
                            record.state = LifecycleState::Scheduled;
                            record.retry_count = 0;
                            record.generation = record.generation.wrapping_add(1);
                            Reschedule::Restart
                        } else {
                            Reschedule::Keep
                        }
                    }
                    LifecycleState::Provisioned if time_changed => {
                        Reschedule::Chain(TaskKind::Start, record.start_time)
                    }
                    LifecycleState::Started if time_changed => Reschedule::Chain(
                        TaskKind::Warning,
                        timing::warning_time(record.delete_at),
                    ),
                    LifecycleState::Warned if time_changed => {
                        Reschedule::Chain(TaskKind::Cleanup, record.delete_at)
                    }
                    _ => Reschedule::Keep,
                };
                (plan, record.clone())
            })
            .await;
        let Some((plan, record)) = updated else {
            return;
        };

        if name_changed && record.has_resources() {
            let names = NameFormatter::new(&config)
                .resource_names(&record.name, record.resources.voice.len());
            match self
                .inner
                .provisioning
                .rename(key.guild, &record.resources, &names)
                .await
            {
                Ok(()) => info!(%key, name = %record.name, "Renamed event resources"),
                Err(e) => error!(%key, error = %e, "Failed to rename event resources"),
            }
        }

        match plan {
            Reschedule::Keep => {}
            Reschedule::Restart => {
                self.inner.scheduler.cancel_all(key);
                let fire_at = timing::creation_time(record.start_time, &config);
                info!(%key, start = %record.start_time, %fire_at, "Event moved, attendance checks restarted");
                self.schedule(key, TaskKind::Main, fire_at);
            }
            Reschedule::Chain(kind, fire_at) => {
                info!(%key, %kind, %fire_at, "Event moved, lifecycle task rescheduled");
                self.schedule(key, kind, fire_at);
            }
        }
    }

    /// The event was deleted or cancelled at the source. The role is kept.
    pub async fn on_deleted(&self, key: EventKey) {
        self.remove_event(key).await;
    }

    pub async fn on_channel_deleted(&self, guild: GuildId, channel: ChannelId) {
        if self.inner.dividers.forget_channel(guild, channel).await {
            return;
        }
        let Some(key) = self.inner.registry.find_by_channel(guild, channel).await else {
            debug!(%guild, %channel, "Deleted channel does not belong to any event");
            return;
        };

        let outcome = self
            .inner
            .registry
            .with_lock(key, |record| {
                if !record.resources.forget(channel) {
                    return None;
                }
                if record.resources.is_empty() && record.state.holds_resources() {
                    record.state = LifecycleState::Removed;
                    Some(Some(record.role_id))
                } else {
                    Some(None)
                }
            })
            .await
            .flatten();

        match outcome {
            Some(Some(role)) => {
                info!(%key, %channel, "Every event channel was deleted manually, removing event");
                self.inner.scheduler.cancel_all(key);
                if let Some(role) = role {
                    self.inner.dividers.revoke(guild, role).await;
                    if let Err(e) = self.inner.provisioning.delete_role(guild, role).await {
                        warn!(%key, %role, error = %e, "Failed to delete event role");
                    }
                }
                self.release_divider(guild).await;
            }
            Some(None) => info!(%key, %channel, "Event channel deleted manually"),
            None => debug!(%key, %channel, "Channel already forgotten"),
        }
    }

    /// An event role was deleted: every event using it is removed.
    pub async fn on_role_deleted(&self, guild: GuildId, role: RoleId) {
        for key in self.inner.registry.find_by_role(guild, role).await {
            info!(%key, %role, "Event role deleted");
            self.remove_event(key).await;
        }
    }

    /// Cancel all tasks of an event, mark it removed and delete its channels.
    async fn remove_event(&self, key: EventKey) -> bool {
        self.inner.scheduler.cancel_all(key);
        let removed = self
            .inner
            .registry
            .with_lock(key, |record| {
                let previous = record.state;
                record.state = LifecycleState::Removed;
                (std::mem::take(&mut record.resources), record.role_id, previous)
            })
            .await;
        let Some((resources, role, previous)) = removed else {
            debug!(%key, "Event is not tracked");
            return false;
        };
        info!(%key, %previous, "Event removed");

        self.delete_resources(key, &resources).await;
        if let Some(role) = role {
            self.inner.dividers.revoke(key.guild, role).await;
        }
        self.release_divider(key.guild).await;
        true
    }

    /// Rebuild lifecycle state for a guild after a restart.
    ///
    /// `events` is the current feed listing of the guild. Persisted resources
    /// of listed events are re-adopted; those of events no longer listed are
    /// deleted.
    pub async fn resume(&self, guild: GuildId, events: Vec<ScheduledEvent>) {
        let stored = match self.inner.registry.store().load(guild).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(%guild, error = %e, "Failed to load stored resources");
                GuildState::new()
            }
        };
        let config = self.inner.configs.get(guild).await;
        let now = self.now();
        let mut listed: HashSet<EventId> = HashSet::new();

        for event in events {
            if event.guild_id != guild || event.status.is_terminal() {
                continue;
            }
            listed.insert(event.id);
            let key = EventKey::new(guild, event.id);
            match stored.get(&event.id) {
                Some(entry) if entry.text.is_some() || !entry.voice.is_empty() => {
                    self.adopt(key, &event, entry, &config, now).await;
                }
                _ => self.on_created(event).await,
            }
        }

        for (event, entry) in stored.iter().filter(|(id, _)| !listed.contains(id)) {
            let key = EventKey::new(guild, *event);
            info!(%key, "Deleting resources of an event that no longer exists");
            let resources = EventResources {
                text: entry.text,
                voice: entry.voice.clone(),
                divider: None,
            };
            self.delete_resources(key, &resources).await;
            if let Some(role) = entry.role
                && let Err(e) = self.inner.provisioning.delete_role(guild, role).await
            {
                warn!(%key, %role, error = %e, "Failed to delete event role");
            }
            if let Err(e) = self.inner.registry.store().remove(guild, *event).await {
                error!(%key, error = %e, "Failed to drop stored resources");
            }
        }
    }

    async fn adopt(
        &self,
        key: EventKey,
        event: &ScheduledEvent,
        entry: &StoredEvent,
        config: &GuildConfig,
        now: OffsetDateTime,
    ) {
        let delete_at = timing::delete_time(event.start_time, config.deletion_hours);
        let warning_at = timing::warning_time(delete_at);
        let (state, next, fire_at) = if now >= warning_at {
            (LifecycleState::Warned, TaskKind::Cleanup, delete_at)
        } else if now >= event.start_time {
            (LifecycleState::Started, TaskKind::Warning, warning_at)
        } else {
            (LifecycleState::Provisioned, TaskKind::Start, event.start_time)
        };

        let divider = match entry.role {
            Some(_) => self.inner.dividers.ensure(key.guild, config).await,
            None => None,
        };
        let mut record =
            EventRecord::new(key, event.name.as_str(), event.start_time, delete_at);
        record.state = state;
        record.role_id = entry.role;
        record.resources = EventResources {
            text: entry.text,
            voice: entry.voice.clone(),
            divider,
        };
        if !self.inner.registry.register(record).await {
            debug!(%key, "Event already tracked");
            return;
        }
        if let (Some(role), Some(_)) = (entry.role, divider) {
            self.inner.dividers.grant(key.guild, role).await;
        }
        info!(%key, %state, %next, %fire_at, "Re-adopted provisioned event");
        self.schedule(key, next, fire_at);
    }

    /// Rename the resources of every provisioned event of a guild with the
    /// current channel template. Returns how many events were renamed.
    pub async fn reformat_guild(&self, guild: GuildId) -> usize {
        let config = self.inner.configs.get(guild).await;
        let formatter = NameFormatter::new(&config);
        let mut renamed = 0;
        for record in self.inner.registry.records(guild).await {
            if !record.has_resources() {
                continue;
            }
            let names = formatter.resource_names(&record.name, record.resources.voice.len());
            match self
                .inner
                .provisioning
                .rename(guild, &record.resources, &names)
                .await
            {
                Ok(()) => renamed += 1,
                Err(e) => error!(key = %record.key, error = %e, "Failed to rename event resources"),
            }
        }
        info!(%guild, renamed, "Reformatted event channels");
        renamed
    }
}
