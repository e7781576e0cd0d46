//! Divider channel bookkeeping.
//!
//! A guild has at most one divider, shown to the role of every event that
//! currently holds resources. Divider failures are logged and never block
//! the lifecycle of an event.

use crate::backend::ProvisioningBackend;
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::{ChannelId, GuildId, RoleId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Divider {
    channel: Option<ChannelId>,
    roles: BTreeSet<RoleId>,
}

pub struct DividerManager {
    backend: Arc<dyn ProvisioningBackend>,
    guilds: Mutex<HashMap<GuildId, Divider>>,
}

impl DividerManager {
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self {
            backend,
            guilds: Mutex::new(HashMap::new()),
        }
    }

    /// Find or create the divider when the guild enables it.
    pub async fn ensure(&self, guild: GuildId, config: &GuildConfig) -> Option<ChannelId> {
        if !config.divider.enabled {
            return None;
        }
        let mut guilds = self.guilds.lock().await;
        let divider = guilds.entry(guild).or_default();
        if let Some(channel) = divider.channel {
            return Some(channel);
        }
        match self
            .backend
            .ensure_divider(guild, config.category_id, &config.divider.name)
            .await
        {
            Ok(channel) => {
                info!(%guild, %channel, "Divider channel ready");
                divider.channel = Some(channel);
                Some(channel)
            }
            Err(e) => {
                warn!(%guild, error = %e, "Failed to ensure divider channel");
                None
            }
        }
    }

    /// Show the divider to an event role.
    pub async fn grant(&self, guild: GuildId, role: RoleId) {
        self.set_access(guild, role, true).await;
    }

    /// Hide the divider from an event role.
    pub async fn revoke(&self, guild: GuildId, role: RoleId) {
        self.set_access(guild, role, false).await;
    }

    async fn set_access(&self, guild: GuildId, role: RoleId, visible: bool) {
        let mut guilds = self.guilds.lock().await;
        let Some(divider) = guilds.get_mut(&guild) else {
            return;
        };
        let changed = if visible {
            divider.roles.insert(role)
        } else {
            divider.roles.remove(&role)
        };
        let Some(channel) = divider.channel.filter(|_| changed) else {
            return;
        };
        if let Err(e) = self
            .backend
            .set_divider_access(guild, channel, role, visible)
            .await
        {
            warn!(%guild, %role, visible, error = %e, "Failed to update divider access");
        }
    }

    /// Delete the divider unless `in_use` resolves to true.
    ///
    /// `in_use` is awaited with the guild bookkeeping locked.
    pub async fn release_if_unused(&self, guild: GuildId, in_use: impl Future<Output = bool>) {
        let mut guilds = self.guilds.lock().await;
        if !guilds.contains_key(&guild) || in_use.await {
            return;
        }
        let Some(channel) = guilds.remove(&guild).and_then(|d| d.channel) else {
            return;
        };
        match self.backend.delete_channel(guild, channel).await {
            Ok(()) => info!(%guild, %channel, "Deleted unused divider channel"),
            Err(e) => warn!(%guild, %channel, error = %e, "Failed to delete divider channel"),
        }
    }

    /// Forget a divider deleted elsewhere. Returns whether `channel` was one.
    pub async fn forget_channel(&self, guild: GuildId, channel: ChannelId) -> bool {
        let mut guilds = self.guilds.lock().await;
        let is_divider = guilds
            .get(&guild)
            .is_some_and(|d| d.channel == Some(channel));
        if is_divider {
            debug!(%guild, %channel, "Divider channel deleted externally");
            guilds.remove(&guild);
        }
        is_divider
    }
}
