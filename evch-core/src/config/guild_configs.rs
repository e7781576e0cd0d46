//! Versioned store of per-guild configuration.
//!
//! Every write bumps a version counter; reloads report the guilds whose
//! channel naming changed so their resources can be renamed.

use evch_sdk::config::{ConfigurationError, GuildConfig};
use evch_sdk::objects::GuildId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// A guild's configuration failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration for guild {guild}: {source}")]
pub struct GuildConfigError {
    pub guild: GuildId,
    #[source]
    pub source: ConfigurationError,
}

/// Shared, validated guild configurations.
///
/// Guilds without an explicit entry use [`GuildConfig::default`].
#[derive(Clone)]
pub struct GuildConfigs {
    inner: Arc<Inner>,
}

struct Inner {
    guilds: RwLock<HashMap<GuildId, Arc<GuildConfig>>>,
    fallback: Arc<GuildConfig>,
    version: AtomicU64,
}

/// Whether two configurations render different channel names.
pub fn naming_changed(old: &GuildConfig, new: &GuildConfig) -> bool {
    old.channel_format != new.channel_format
        || old.space_replacer != new.space_replacer
        || old.channel_name_limit != new.channel_name_limit
}

impl GuildConfigs {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                guilds: RwLock::new(HashMap::new()),
                fallback: Arc::new(GuildConfig::default()),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Build a store from configurations, validating every one of them.
    pub fn from_configs(
        configs: impl IntoIterator<Item = (GuildId, GuildConfig)>,
    ) -> Result<Self, GuildConfigError> {
        let validated = validate_all(configs)?;
        let store = Self::new();
        // The store is not shared yet, so the lock is uncontended.
        if let Ok(mut guilds) = store.inner.guilds.try_write() {
            *guilds = validated;
        }
        Ok(store)
    }

    /// The configuration of a guild, or the defaults.
    pub async fn get(&self, guild: GuildId) -> Arc<GuildConfig> {
        self.inner
            .guilds
            .read()
            .await
            .get(&guild)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.inner.fallback))
    }

    pub async fn guilds(&self) -> Vec<GuildId> {
        let mut guilds: Vec<GuildId> = self.inner.guilds.read().await.keys().copied().collect();
        guilds.sort();
        guilds
    }

    /// Validate and store one guild's configuration, returning the previous one.
    pub async fn upsert(
        &self,
        guild: GuildId,
        config: GuildConfig,
    ) -> Result<Arc<GuildConfig>, GuildConfigError> {
        config
            .validate()
            .map_err(|source| GuildConfigError { guild, source })?;
        let mut guilds = self.inner.guilds.write().await;
        let previous = guilds
            .insert(guild, Arc::new(config))
            .unwrap_or_else(|| Arc::clone(&self.inner.fallback));
        drop(guilds);
        self.bump();
        Ok(previous)
    }

    /// Replace every configuration at once, as on a reload.
    ///
    /// Nothing is replaced if any configuration is invalid. Returns the guilds
    /// whose channel naming changed.
    pub async fn replace_all(
        &self,
        configs: impl IntoIterator<Item = (GuildId, GuildConfig)>,
    ) -> Result<Vec<GuildId>, GuildConfigError> {
        let validated = validate_all(configs)?;
        let mut guilds = self.inner.guilds.write().await;

        let mut renamed: Vec<GuildId> = validated
            .iter()
            .chain(guilds.iter().filter(|(id, _)| !validated.contains_key(id)))
            .filter(|(id, _)| {
                let old = guilds.get(id).unwrap_or(&self.inner.fallback);
                let new = validated.get(id).unwrap_or(&self.inner.fallback);
                naming_changed(old, new)
            })
            .map(|(id, _)| *id)
            .collect();
        renamed.sort();
        renamed.dedup();

        *guilds = validated;
        drop(guilds);
        self.bump();
        Ok(renamed)
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.inner.version.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for GuildConfigs {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_all(
    configs: impl IntoIterator<Item = (GuildId, GuildConfig)>,
) -> Result<HashMap<GuildId, Arc<GuildConfig>>, GuildConfigError> {
    configs
        .into_iter()
        .map(|(guild, config)| {
            config
                .validate()
                .map(|()| (guild, Arc::new(config)))
                .map_err(|source| GuildConfigError { guild, source })
        })
        .collect()
}
