//! Per-guild configuration.
//!
//! [`GuildConfig`] is written by an external configuration surface and is
//! read-only to the lifecycle. Every write goes through
//! [`GuildConfig::validate`], so invalid rule combinations are rejected
//! before anything is scheduled.

mod error;
pub mod rules;

pub use error::ConfigurationError;
pub use rules::{KeywordRule, MinimumAttendanceRule, VoiceMultiplierRule, first_match};

use crate::objects::{ChannelId, RoleId};
use chrono_tz::Tz;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Upper bound for the creation offset, in minutes.
pub const MAX_CREATION_MINUTES: u32 = 1440;
/// Accepted voice multiplier range.
pub const MULTIPLIER_RANGE: std::ops::RangeInclusive<u32> = 1..=99;
/// Accepted minimum attendance range.
pub const MINIMUM_RANGE: std::ops::RangeInclusive<u32> = 1..=999;
/// Accepted numeric channel-name limit range (the platform maximum is 100).
pub const NAME_LIMIT_RANGE: std::ops::RangeInclusive<usize> = 1..=100;
/// Longest accepted truncation delimiter.
pub const MAX_DELIMITER_CHARS: usize = 5;

/// How the `{name}` portion of channel names is shortened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNameLimit {
    /// Maximum number of characters kept.
    pub max_chars: usize,
    /// Cut right after the first occurrence of this string. Falls back to
    /// `max_chars` when the delimiter does not occur.
    pub delimiter: Option<CompactString>,
}

impl Default for ChannelNameLimit {
    fn default() -> Self {
        Self {
            max_chars: 100,
            delimiter: None,
        }
    }
}

/// The organisational divider channel shown above event channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DividerConfig {
    pub enabled: bool,
    pub name: String,
}

impl Default for DividerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "━━━━━━ EVENT CHANNELS ━━━━━━".to_string(),
        }
    }
}

/// Configuration of one guild scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    /// Category under which event channels are created.
    pub category_id: Option<ChannelId>,
    /// IANA timezone used to render role names.
    pub timezone: String,
    /// Minutes before start at which the first attendance check runs.
    pub creation_minutes: u32,
    /// Hours after start at which resources are deleted.
    pub deletion_hours: u32,
    pub role_format: String,
    pub channel_format: String,
    pub space_replacer: String,
    pub channel_name_limit: ChannelNameLimit,
    /// `None` or empty disables the message.
    pub announcement_message: Option<String>,
    pub event_start_message: Option<String>,
    pub deletion_warning_message: Option<String>,
    /// Posted when deletion is postponed; `{time}` is the new deletion time.
    pub deletion_extension_message: Option<String>,
    pub divider: DividerConfig,
    pub voice_multipliers: Vec<VoiceMultiplierRule>,
    pub minimum_attendance: Vec<MinimumAttendanceRule>,
    /// Absolute minutes before start of each attendance retry.
    pub retry_offsets: Vec<u32>,
    /// Roles that always get access to event channels.
    pub whitelisted_roles: Vec<RoleId>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            category_id: None,
            timezone: "UTC".to_string(),
            creation_minutes: 15,
            deletion_hours: 4,
            role_format: "{name} {day_abbrev} {day}. {month_abbrev} {time}".to_string(),
            channel_format: "{name}᲼{type}".to_string(),
            space_replacer: "᲼".to_string(),
            channel_name_limit: ChannelNameLimit::default(),
            announcement_message: Some("{role} The event is starting soon!".to_string()),
            event_start_message: Some("{role} The event is starting now!".to_string()),
            deletion_warning_message: Some(
                "⚠️ These channels will be deleted in 15 minutes.".to_string(),
            ),
            deletion_extension_message: Some(
                "⏰ Deletion postponed by 4 hours. These channels will now be deleted {time}."
                    .to_string(),
            ),
            divider: DividerConfig::default(),
            voice_multipliers: Vec::new(),
            minimum_attendance: Vec::new(),
            retry_offsets: vec![10, 5, 2],
            whitelisted_roles: Vec::new(),
        }
    }
}

fn enabled(template: &Option<String>) -> Option<&str> {
    template.as_deref().filter(|t| !t.trim().is_empty())
}

impl GuildConfig {
    pub fn announcement_template(&self) -> Option<&str> {
        enabled(&self.announcement_message)
    }

    pub fn start_template(&self) -> Option<&str> {
        enabled(&self.event_start_message)
    }

    pub fn warning_template(&self) -> Option<&str> {
        enabled(&self.deletion_warning_message)
    }

    pub fn extension_template(&self) -> Option<&str> {
        enabled(&self.deletion_extension_message)
    }

    /// The configured timezone.
    pub fn tz(&self) -> Result<Tz, ConfigurationError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigurationError::UnknownTimezone(self.timezone.clone()))
    }

    /// Check every constraint the lifecycle relies on.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.creation_minutes > MAX_CREATION_MINUTES {
            return Err(ConfigurationError::CreationOffsetTooLarge(
                self.creation_minutes,
            ));
        }
        if self.deletion_hours == 0 {
            return Err(ConfigurationError::DeletionOffsetTooSmall);
        }
        self.tz()?;

        if !NAME_LIMIT_RANGE.contains(&self.channel_name_limit.max_chars) {
            return Err(ConfigurationError::ChannelNameLimitOutOfRange(
                self.channel_name_limit.max_chars,
            ));
        }
        if let Some(delimiter) = &self.channel_name_limit.delimiter
            && delimiter.chars().count() > MAX_DELIMITER_CHARS
        {
            return Err(ConfigurationError::DelimiterTooLong(delimiter.to_string()));
        }

        check_keywords(self.voice_multipliers.iter().map(|r| r.keyword.as_str()))?;
        check_keywords(self.minimum_attendance.iter().map(|r| r.keyword.as_str()))?;

        for rule in &self.voice_multipliers {
            if !MULTIPLIER_RANGE.contains(&rule.multiplier) {
                return Err(ConfigurationError::MultiplierOutOfRange {
                    keyword: rule.keyword.to_string(),
                    multiplier: rule.multiplier,
                });
            }
        }
        for rule in &self.minimum_attendance {
            if !MINIMUM_RANGE.contains(&rule.minimum) {
                return Err(ConfigurationError::MinimumOutOfRange {
                    keyword: rule.keyword.to_string(),
                    minimum: rule.minimum,
                });
            }
            let keyword = rule.keyword.to_lowercase();
            let paired = self
                .voice_multipliers
                .iter()
                .any(|m| m.keyword.to_lowercase() == keyword);
            if !paired {
                return Err(ConfigurationError::MinimumWithoutMultiplier(
                    rule.keyword.to_string(),
                ));
            }
        }

        if let Some(&too_large) = self
            .retry_offsets
            .iter()
            .find(|&&m| m > MAX_CREATION_MINUTES)
        {
            return Err(ConfigurationError::RetryOffsetTooLarge(too_large));
        }
        if self.retry_offsets.windows(2).any(|w| w[0] <= w[1]) {
            return Err(ConfigurationError::RetryOffsetsNotDescending);
        }

        Ok(())
    }
}

fn check_keywords<'a>(keywords: impl Iterator<Item = &'a str>) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for keyword in keywords {
        if keyword.trim().is_empty() {
            return Err(ConfigurationError::EmptyKeyword);
        }
        if !seen.insert(keyword.to_lowercase()) {
            return Err(ConfigurationError::DuplicateKeyword(keyword.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_rules(multipliers: &[(&str, u32)], minimums: &[(&str, u32)]) -> GuildConfig {
        GuildConfig {
            voice_multipliers: multipliers
                .iter()
                .map(|(k, m)| VoiceMultiplierRule {
                    keyword: (*k).into(),
                    multiplier: *m,
                })
                .collect(),
            minimum_attendance: minimums
                .iter()
                .map(|(k, m)| MinimumAttendanceRule {
                    keyword: (*k).into(),
                    minimum: *m,
                })
                .collect(),
            ..GuildConfig::default()
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(GuildConfig::default().validate(), Ok(()));
    }

    #[test]
    fn minimum_without_multiplier_is_rejected() {
        let config = with_rules(&[("hero", 9)], &[("sword", 5)]);
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::MinimumWithoutMultiplier("sword".into()))
        );

        let paired = with_rules(&[("Hero", 9)], &[("hero", 10)]);
        assert_eq!(paired.validate(), Ok(()));
    }

    #[test]
    fn non_ascii_keywords_pair_case_insensitively() {
        let paired = with_rules(&[("ÉPÉE", 4)], &[("épée", 6)]);
        assert_eq!(paired.validate(), Ok(()));
        assert!(rules::first_match(&paired.minimum_attendance, "Nuit de l'Épée").is_some());

        let greek = with_rules(&[("ΑΓΩΝ", 4)], &[("αγων", 6)]);
        assert_eq!(greek.validate(), Ok(()));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = GuildConfig {
            creation_minutes: 1441,
            ..GuildConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::CreationOffsetTooLarge(1441))
        );

        assert!(matches!(
            with_rules(&[("hero", 100)], &[]).validate(),
            Err(ConfigurationError::MultiplierOutOfRange { multiplier: 100, .. })
        ));
        assert!(matches!(
            with_rules(&[("hero", 9)], &[("hero", 1000)]).validate(),
            Err(ConfigurationError::MinimumOutOfRange { minimum: 1000, .. })
        ));
        assert!(matches!(
            with_rules(&[("hero", 0)], &[]).validate(),
            Err(ConfigurationError::MultiplierOutOfRange { multiplier: 0, .. })
        ));
    }

    #[test]
    fn duplicate_keywords_and_bad_offsets_are_rejected() {
        assert_eq!(
            with_rules(&[("hero", 9), ("HERO", 4)], &[]).validate(),
            Err(ConfigurationError::DuplicateKeyword("HERO".into()))
        );

        let config = GuildConfig {
            retry_offsets: vec![5, 10],
            ..GuildConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::RetryOffsetsNotDescending)
        );

        let config = GuildConfig {
            timezone: "Mars/Olympus".into(),
            ..GuildConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::UnknownTimezone("Mars/Olympus".into()))
        );
    }

    #[test]
    fn empty_templates_are_disabled() {
        let config = GuildConfig {
            announcement_message: Some("   ".into()),
            event_start_message: None,
            ..GuildConfig::default()
        };
        assert_eq!(config.announcement_template(), None);
        assert_eq!(config.start_template(), None);
        assert!(config.warning_template().is_some());

        let defaults = GuildConfig::default();
        assert!(defaults.extension_template().unwrap().contains("{time}"));
        let silent = GuildConfig {
            deletion_extension_message: Some(String::new()),
            ..GuildConfig::default()
        };
        assert_eq!(silent.extension_template(), None);
    }

    #[test]
    fn guild_config_reads_from_toml_with_ordered_rules() {
        let config: GuildConfig = toml::from_str(
            r#"
timezone = "Europe/Amsterdam"
creation_minutes = 30

[channel_name_limit]
delimiter = "﹕"

[[voice_multipliers]]
keyword = "hero"
multiplier = 9

[[voice_multipliers]]
keyword = "sword"
multiplier = 4

[[minimum_attendance]]
keyword = "hero"
minimum = 10
"#,
        )
        .unwrap();
        assert_eq!(config.creation_minutes, 30);
        assert_eq!(config.deletion_hours, 4);
        assert_eq!(config.channel_name_limit.max_chars, 100);
        assert_eq!(config.voice_multipliers[1].keyword, "sword");
        assert_eq!(config.validate(), Ok(()));
    }
}
