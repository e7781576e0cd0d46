//! In-memory collaborators recording every call.

use crate::backend::{
    AttendanceCheckError, GuildRole, MemberCount, MembershipLookup, NotificationBackend,
    NotificationError, ProvisionRequest, ProvisioningBackend, ProvisioningError, ResourceAccess,
    ResourceNames,
};
use crate::clock::TokioClock;
use crate::config::GuildConfigs;
use crate::naming::NameFormatter;
use crate::orchestrator::{Collaborators, LifecycleOrchestrator};
use crate::registry::{EventKey, EventResources};
use crate::storage::MemoryStore;
use async_trait::async_trait;
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::{ChannelId, EventId, EventStatus, GuildId, RoleId, ScheduledEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

pub const GUILD: GuildId = GuildId(100);
/// Wall time at which every harness starts.
pub const T0: OffsetDateTime = datetime!(2025-06-01 17:00 UTC);
/// Default event start, one hour after `T0`.
pub const START: OffsetDateTime = datetime!(2025-06-01 18:00 UTC);

#[derive(Default)]
pub struct FakeMembership {
    roles: Mutex<Vec<GuildRole>>,
    samples: Mutex<HashMap<RoleId, VecDeque<u32>>>,
    lookups: AtomicU64,
    lookup_delay: Mutex<Option<Duration>>,
    pub unreliable: AtomicBool,
    pub fail_lookups: AtomicBool,
}

impl FakeMembership {
    pub fn add_role(&self, id: RoleId, name: impl Into<String>) {
        self.roles.lock().unwrap().push(GuildRole {
            id,
            name: name.into(),
        });
    }

    /// Member counts returned by successive lookups. The last one repeats.
    pub fn set_samples(&self, role: RoleId, samples: &[u32]) {
        self.samples
            .lock()
            .unwrap()
            .insert(role, samples.iter().copied().collect());
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Make `member_count` take this long (on the tokio clock).
    pub fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl MembershipLookup for FakeMembership {
    async fn guild_roles(&self, _guild: GuildId) -> Result<Vec<GuildRole>, AttendanceCheckError> {
        Ok(self.roles.lock().unwrap().clone())
    }

    async fn member_count(
        &self,
        _guild: GuildId,
        role: RoleId,
    ) -> Result<MemberCount, AttendanceCheckError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AttendanceCheckError::LookupFailed("gateway timeout".into()));
        }
        let mut samples = self.samples.lock().unwrap();
        let queue = samples.entry(role).or_default();
        let count = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().copied().unwrap_or_default()
        };
        Ok(MemberCount {
            count,
            reliable: !self.unreliable.load(Ordering::SeqCst),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningCall {
    Create(ProvisionRequest),
    Rename(EventResources, ResourceNames),
    Lock(EventResources, ResourceAccess),
    Unlock(EventResources, ResourceAccess),
    Delete(EventResources),
    DeleteRole(RoleId),
    EnsureDivider(GuildId),
    DividerAccess(ChannelId, RoleId, bool),
    DeleteChannel(ChannelId),
}

pub struct FakeProvisioning {
    calls: Mutex<Vec<ProvisioningCall>>,
    next_id: AtomicU64,
    create_delay: Mutex<Option<Duration>>,
    pub fail_create: AtomicBool,
}

impl Default for FakeProvisioning {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(5000),
            create_delay: Mutex::new(None),
            fail_create: AtomicBool::new(false),
        }
    }
}

impl FakeProvisioning {
    pub fn calls(&self) -> Vec<ProvisioningCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<ProvisionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProvisioningCall::Create(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<EventResources> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProvisioningCall::Delete(resources) => Some(resources),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_roles(&self) -> Vec<RoleId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProvisioningCall::DeleteRole(role) => Some(role),
                _ => None,
            })
            .collect()
    }

    /// Make `create` take this long (on the tokio clock).
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    fn record(&self, call: ProvisioningCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_channel(&self) -> ChannelId {
        ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ProvisioningBackend for FakeProvisioning {
    async fn create(&self, request: &ProvisionRequest) -> Result<EventResources, ProvisioningError> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(ProvisioningCall::Create(request.clone()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProvisioningError::Rejected {
                status: 403,
                message: "missing permissions".into(),
            });
        }
        Ok(EventResources {
            text: Some(self.next_channel()),
            voice: request.names.voice.iter().map(|_| self.next_channel()).collect(),
            divider: None,
        })
    }

    async fn rename(
        &self,
        _guild: GuildId,
        resources: &EventResources,
        names: &ResourceNames,
    ) -> Result<(), ProvisioningError> {
        self.record(ProvisioningCall::Rename(resources.clone(), names.clone()));
        Ok(())
    }

    async fn lock(
        &self,
        _guild: GuildId,
        resources: &EventResources,
        access: &ResourceAccess,
    ) -> Result<(), ProvisioningError> {
        self.record(ProvisioningCall::Lock(resources.clone(), access.clone()));
        Ok(())
    }

    async fn unlock(
        &self,
        _guild: GuildId,
        resources: &EventResources,
        access: &ResourceAccess,
    ) -> Result<(), ProvisioningError> {
        self.record(ProvisioningCall::Unlock(resources.clone(), access.clone()));
        Ok(())
    }

    async fn delete(
        &self,
        _guild: GuildId,
        resources: &EventResources,
    ) -> Result<(), ProvisioningError> {
        self.record(ProvisioningCall::Delete(resources.clone()));
        Ok(())
    }

    async fn delete_role(&self, _guild: GuildId, role: RoleId) -> Result<(), ProvisioningError> {
        self.record(ProvisioningCall::DeleteRole(role));
        Ok(())
    }

    async fn ensure_divider(
        &self,
        guild: GuildId,
        _category: Option<ChannelId>,
        _name: &str,
    ) -> Result<ChannelId, ProvisioningError> {
        self.record(ProvisioningCall::EnsureDivider(guild));
        Ok(self.next_channel())
    }

    async fn set_divider_access(
        &self,
        _guild: GuildId,
        divider: ChannelId,
        role: RoleId,
        visible: bool,
    ) -> Result<(), ProvisioningError> {
        self.record(ProvisioningCall::DividerAccess(divider, role, visible));
        Ok(())
    }

    async fn delete_channel(
        &self,
        _guild: GuildId,
        channel: ChannelId,
    ) -> Result<(), ProvisioningError> {
        self.record(ProvisioningCall::DeleteChannel(channel));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotifications {
    posts: Mutex<Vec<(ChannelId, String)>>,
    activity: Mutex<HashMap<ChannelId, OffsetDateTime>>,
}

impl FakeNotifications {
    pub fn posts(&self) -> Vec<(ChannelId, String)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn set_activity(&self, channel: ChannelId, at: OffsetDateTime) {
        self.activity.lock().unwrap().insert(channel, at);
    }
}

#[async_trait]
impl NotificationBackend for FakeNotifications {
    async fn post(
        &self,
        _guild: GuildId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), NotificationError> {
        self.posts.lock().unwrap().push((channel, text.to_string()));
        Ok(())
    }

    async fn last_activity(
        &self,
        _guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<OffsetDateTime>, NotificationError> {
        Ok(self.activity.lock().unwrap().get(&channel).copied())
    }
}

/// An orchestrator wired to fakes, with the wall clock at [`T0`].
pub struct Harness {
    pub orchestrator: LifecycleOrchestrator,
    pub membership: Arc<FakeMembership>,
    pub provisioning: Arc<FakeProvisioning>,
    pub notifications: Arc<FakeNotifications>,
    pub store: Arc<MemoryStore>,
    pub config: GuildConfig,
}

impl Harness {
    pub fn new(config: GuildConfig) -> Self {
        Self::with_store(config, MemoryStore::new())
    }

    pub fn with_store(config: GuildConfig, store: MemoryStore) -> Self {
        let membership = Arc::new(FakeMembership::default());
        let provisioning = Arc::new(FakeProvisioning::default());
        let notifications = Arc::new(FakeNotifications::default());
        let store = Arc::new(store);
        let configs = GuildConfigs::from_configs([(GUILD, config.clone())]).unwrap();
        let orchestrator = LifecycleOrchestrator::new(
            configs,
            Arc::new(TokioClock::starting_at(T0)),
            Collaborators {
                membership: membership.clone(),
                provisioning: provisioning.clone(),
                notifications: notifications.clone(),
                store: store.clone(),
            },
        );
        Self {
            orchestrator,
            membership,
            provisioning,
            notifications,
            store,
            config,
        }
    }

    pub fn event(&self, id: u64, name: &str, start: OffsetDateTime) -> ScheduledEvent {
        ScheduledEvent {
            id: EventId(id),
            guild_id: GUILD,
            name: name.to_string(),
            start_time: start,
            status: EventStatus::Scheduled,
        }
    }

    /// Create the role the platform would create for `event`.
    pub fn add_event_role(&self, event: &ScheduledEvent, role: RoleId) {
        let name = NameFormatter::new(&self.config)
            .role_name(&event.name, event.start_time)
            .unwrap();
        self.membership.add_role(role, name);
    }

    pub fn key(id: u64) -> EventKey {
        EventKey::new(GUILD, EventId(id))
    }

    /// Advance the paused tokio clock to wall time `at` and let every task
    /// that became ready run to completion.
    pub async fn advance_to(&self, at: OffsetDateTime) {
        let delta = at - self.orchestrator.now();
        if delta.is_positive() {
            tokio::time::sleep(Duration::try_from(delta).unwrap()).await;
        }
        // The paused clock only moves once the runtime is idle.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
