//! Configuration module for evch-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{FileConfig, GatewayConfig};
use evch_core::config::GuildConfigError;
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::GuildId;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error(transparent)]
    InvalidGuild(#[from] GuildConfigError),

    #[error("guild {0} is configured more than once")]
    DuplicateGuild(GuildId),

    #[error("no gateway token configured (set gateway.token or EVCH_GATEWAY_TOKEN)")]
    MissingGatewayToken,
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub gateway: GatewayConfig,
    pub state_path: PathBuf,
    pub guilds: Vec<(GuildId, GuildConfig)>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
    token_override: Option<String>,
}

impl ConfigLoader {
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        token_override: Option<String>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            token_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI and environment overrides
    /// 3. Validate every guild configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.parse(&config_content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn parse(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(token) = &self.token_override {
            file_config.gateway.token = token.clone();
        }

        self.validate(&file_config)?;

        Ok(LoadedConfig {
            listen: file_config.server.listen,
            gateway: file_config.gateway,
            state_path: file_config.storage.path,
            guilds: file_config
                .guilds
                .into_iter()
                .map(|entry| (entry.id, entry.config))
                .collect(),
        })
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.gateway.token.trim().is_empty() {
            return Err(ConfigError::MissingGatewayToken);
        }
        let mut seen = HashSet::new();
        for entry in &config.guilds {
            if !seen.insert(entry.id) {
                return Err(ConfigError::DuplicateGuild(entry.id));
            }
            entry.config.validate().map_err(|source| GuildConfigError {
                guild: entry.id,
                source,
            })?;
        }
        Ok(())
    }
}
