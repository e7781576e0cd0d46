//! Runtime guild configuration.
//!
//! Configuration is loaded and parsed by the server crate; this module holds
//! the validated result.

mod guild_configs;

pub use guild_configs::{GuildConfigError, GuildConfigs, naming_changed};
