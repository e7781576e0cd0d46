//! The event lifecycle state machine.
//!
//! ```text
//! Scheduled --main--> AttendanceRetry(0) --pass--> Provisioning --> Provisioned
//!                     AttendanceRetry(n) --fail--> AttendanceRetry(m) | Abandoned
//! Provisioned --start--> Started --warning--> Warned --cleanup--> Cleanup --> Removed
//! any non-terminal state --deleted, cancelled, role deleted--> Removed
//! ```
//!
//! Every handler enters the event through [`EventRegistry::with_lock`], checks
//! that the state it expects is still current, commits its transition and
//! only then performs collaborator I/O outside the lock. A handler that finds
//! an unexpected state is a stale timer or lost race and does nothing.

mod chain;
mod checkpoint;
mod feed;

use crate::backend::{
    MembershipLookup, NotificationBackend, ProvisioningBackend, ResourceAccess,
};
use crate::clock::Clock;
use crate::config::GuildConfigs;
use crate::divider::DividerManager;
use crate::naming::render_message;
use crate::registry::{EventKey, EventRecord, EventRegistry, EventResources};
use crate::scheduler::{TaskHandle, TaskKind, TaskScheduler};
use crate::storage::ResourceStore;
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::{FeedEvent, GuildId};
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// External collaborators of the orchestrator.
pub struct Collaborators {
    pub membership: Arc<dyn MembershipLookup>,
    pub provisioning: Arc<dyn ProvisioningBackend>,
    pub notifications: Arc<dyn NotificationBackend>,
    pub store: Arc<dyn ResourceStore>,
}

/// Drives every tracked event through its lifecycle.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: EventRegistry,
    scheduler: TaskScheduler,
    configs: GuildConfigs,
    clock: Arc<dyn Clock>,
    membership: Arc<dyn MembershipLookup>,
    provisioning: Arc<dyn ProvisioningBackend>,
    notifications: Arc<dyn NotificationBackend>,
    dividers: DividerManager,
}

impl LifecycleOrchestrator {
    pub fn new(configs: GuildConfigs, clock: Arc<dyn Clock>, collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: EventRegistry::new(collaborators.store),
                scheduler: TaskScheduler::new(Arc::clone(&clock)),
                configs,
                clock,
                membership: collaborators.membership,
                dividers: DividerManager::new(Arc::clone(&collaborators.provisioning)),
                provisioning: collaborators.provisioning,
                notifications: collaborators.notifications,
            }),
        }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.inner.registry
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.inner.scheduler
    }

    pub fn configs(&self) -> &GuildConfigs {
        &self.inner.configs
    }

    pub fn now(&self) -> OffsetDateTime {
        self.inner.clock.now()
    }

    /// Cancel every pending task. Records and resources are left as they are
    /// and are re-adopted by [`resume`](Self::resume) on the next start.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    fn schedule(&self, key: EventKey, kind: TaskKind, fire_at: OffsetDateTime) -> TaskHandle {
        debug!(%key, %kind, %fire_at, "Scheduling task");
        let this = self.clone();
        self.inner
            .scheduler
            .schedule(key, kind, fire_at, async move { this.run_task(key, kind).await })
    }

    async fn run_task(&self, key: EventKey, kind: TaskKind) {
        match kind {
            TaskKind::Main | TaskKind::Retry(_) => self.run_checkpoint(key, kind).await,
            TaskKind::Start => self.run_start(key).await,
            TaskKind::Warning => self.run_warning(key).await,
            TaskKind::Cleanup => self.run_cleanup(key).await,
        }
    }

    /// Post a rendered template to the event's text channel.
    async fn notify(&self, record: &EventRecord, template: Option<&str>, at: OffsetDateTime) {
        let (Some(template), Some(channel)) = (template, record.resources.text) else {
            return;
        };
        let text = render_message(template, record.role_id, &record.name, at);
        if let Err(e) = self
            .inner
            .notifications
            .post(record.key.guild, channel, &text)
            .await
        {
            warn!(key = %record.key, %channel, error = %e, "Failed to post notification");
        }
    }

    /// Best-effort deletion of an event's channels.
    async fn delete_resources(&self, key: EventKey, resources: &EventResources) {
        if resources.is_empty() {
            return;
        }
        if let Err(e) = self.inner.provisioning.delete(key.guild, resources).await {
            warn!(%key, error = %e, "Failed to delete event resources");
        }
    }

    /// Delete the divider when no event of the guild holds resources anymore.
    async fn release_divider(&self, guild: GuildId) {
        let registry = &self.inner.registry;
        self.inner
            .dividers
            .release_if_unused(guild, registry.guild_uses_divider(guild))
            .await;
    }

    fn access(record: &EventRecord, config: &GuildConfig) -> ResourceAccess {
        ResourceAccess {
            role: record.role_id,
            whitelisted_roles: config.whitelisted_roles.clone(),
        }
    }
}

impl Processor<FeedEvent> for LifecycleOrchestrator {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, event: FeedEvent) -> Result<(), Infallible> {
        match event {
            FeedEvent::Created { event } => self.on_created(event).await,
            FeedEvent::Updated { event } => self.on_updated(event).await,
            FeedEvent::Deleted { guild_id, event_id } => {
                self.on_deleted(EventKey::new(guild_id, event_id)).await;
            }
            FeedEvent::ChannelDeleted {
                guild_id,
                channel_id,
            } => self.on_channel_deleted(guild_id, channel_id).await,
            FeedEvent::RoleDeleted { guild_id, role_id } => {
                self.on_role_deleted(guild_id, role_id).await;
            }
        }
        Ok(())
    }
}

/// Postpone deletion of an event's resources.
#[derive(Debug, Clone, Copy)]
pub struct ExtendDeletion {
    pub key: EventKey,
}

impl Processor<ExtendDeletion> for LifecycleOrchestrator {
    type Output = bool;
    type Error = Infallible;

    async fn process(&self, request: ExtendDeletion) -> Result<bool, Infallible> {
        Ok(self.extend_deletion(request.key).await)
    }
}

/// List the tracked records of a guild.
#[derive(Debug, Clone, Copy)]
pub struct ListGuildEvents {
    pub guild: GuildId,
}

impl Processor<ListGuildEvents> for LifecycleOrchestrator {
    type Output = Vec<EventRecord>;
    type Error = Infallible;

    async fn process(&self, request: ListGuildEvents) -> Result<Vec<EventRecord>, Infallible> {
        Ok(self.inner.registry.records(request.guild).await)
    }
}
