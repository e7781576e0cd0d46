//! Channel and role name rendering.

use crate::backend::{AttendanceCheckError, GuildRole, ResourceNames};
use chrono::{DateTime, Datelike};
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::RoleId;
use time::OffsetDateTime;

/// Kind of an event channel, substituted for `{type}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Text => "text",
            ChannelKind::Voice => "voice",
        }
    }
}

/// Replace `{key}` placeholders in a single pass.
///
/// Unknown placeholders are kept verbatim, and substituted values are never
/// re-scanned, so an event named `{type}` stays `{type}`.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let replaced = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close + 1))
        });
        match replaced {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render a notification template.
///
/// `{role}` becomes a role mention (empty when the role is unknown), `{event}`
/// the event name and `{time}` a relative timestamp of `at`.
pub fn render_message(
    template: &str,
    role: Option<RoleId>,
    event_name: &str,
    at: OffsetDateTime,
) -> String {
    let mention = role.map(|r| r.mention()).unwrap_or_default();
    let timestamp = format!("<t:{}:R>", at.unix_timestamp());
    fill(
        template,
        &[
            ("role", mention.as_str()),
            ("event", event_name),
            ("time", timestamp.as_str()),
        ],
    )
    .trim()
    .to_string()
}

/// Renders names for one guild's configuration.
pub struct NameFormatter<'a> {
    config: &'a GuildConfig,
}

impl<'a> NameFormatter<'a> {
    pub fn new(config: &'a GuildConfig) -> Self {
        Self { config }
    }

    /// The `{name}` portion of channel names: lowercased, spaces replaced,
    /// then truncated.
    pub fn base_name(&self, event_name: &str) -> String {
        let base = event_name
            .to_lowercase()
            .replace(' ', &self.config.space_replacer);
        let limit = &self.config.channel_name_limit;

        if let Some(delimiter) = limit.delimiter.as_deref().filter(|d| !d.is_empty())
            && let Some(at) = base.find(delimiter)
        {
            return base[..at + delimiter.len()].to_string();
        }
        base.chars().take(limit.max_chars).collect()
    }

    pub fn channel_name(&self, event_name: &str, kind: ChannelKind) -> String {
        let base = self.base_name(event_name);
        fill(
            &self.config.channel_format,
            &[("name", base.as_str()), ("type", kind.as_str())],
        )
    }

    /// Names for a text channel and `voice_count` voice channels.
    ///
    /// A single voice channel carries no ordinal; several are numbered from 1.
    pub fn resource_names(&self, event_name: &str, voice_count: usize) -> ResourceNames {
        let voice = self.channel_name(event_name, ChannelKind::Voice);
        ResourceNames {
            text: self.channel_name(event_name, ChannelKind::Text),
            voice: match voice_count {
                0 => Vec::new(),
                1 => vec![voice],
                n => (1..=n).map(|i| format!("{voice} {i}")).collect(),
            },
        }
    }

    /// The exact role name expected for an event.
    pub fn role_name(
        &self,
        event_name: &str,
        start: OffsetDateTime,
    ) -> Result<String, AttendanceCheckError> {
        let tz = self.config.tz()?;
        let local = DateTime::from_timestamp(start.unix_timestamp(), 0)
            .ok_or(AttendanceCheckError::UnrenderableTime(start))?
            .with_timezone(&tz);

        let day_abbrev = local.format("%a").to_string();
        let day = local.day().to_string();
        let month_abbrev = local.format("%b").to_string();
        let time = local.format("%H:%M").to_string();
        Ok(fill(
            &self.config.role_format,
            &[
                ("name", event_name),
                ("day_abbrev", day_abbrev.as_str()),
                ("day", day.as_str()),
                ("month_abbrev", month_abbrev.as_str()),
                ("time", time.as_str()),
            ],
        ))
    }

    /// Find the role whose name is exactly the expected role name.
    pub fn find_role(
        &self,
        roles: &[GuildRole],
        event_name: &str,
        start: OffsetDateTime,
    ) -> Result<RoleId, AttendanceCheckError> {
        let expected = self.role_name(event_name, start)?;
        roles
            .iter()
            .find(|role| role.name == expected)
            .map(|role| role.id)
            .ok_or(AttendanceCheckError::RoleNotFound(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evch_sdk::config::ChannelNameLimit;
    use time::macros::datetime;

    const RAW: &str = "Sunday﹒Hero's Realm﹒POST RESET﹕10 man";

    fn config(limit: ChannelNameLimit) -> GuildConfig {
        GuildConfig {
            channel_name_limit: limit,
            ..GuildConfig::default()
        }
    }

    #[test]
    fn delimiter_truncation_is_inclusive() {
        let config = config(ChannelNameLimit {
            max_chars: 100,
            delimiter: Some("﹕".into()),
        });
        let formatter = NameFormatter::new(&config);
        assert_eq!(
            formatter.base_name(RAW),
            "sunday﹒hero's realm﹒post reset﹕".replace(' ', "᲼")
        );
    }

    #[test]
    fn numeric_truncation_keeps_leading_characters() {
        let config = config(ChannelNameLimit {
            max_chars: 30,
            delimiter: None,
        });
        let base = NameFormatter::new(&config).base_name(RAW);
        assert_eq!(base.chars().count(), 30);
        assert_eq!(base, "sunday﹒hero's realm﹒post reset".replace(' ', "᲼"));
    }

    #[test]
    fn missing_delimiter_falls_back_to_numeric_limit() {
        let config = config(ChannelNameLimit {
            max_chars: 6,
            delimiter: Some("|".into()),
        });
        assert_eq!(NameFormatter::new(&config).base_name(RAW), "sunday");
    }

    #[test]
    fn voice_ordinals_only_when_several() {
        let config = GuildConfig::default();
        let formatter = NameFormatter::new(&config);

        let single = formatter.resource_names("Raid Night", 1);
        assert_eq!(single.text, "raid᲼night᲼text");
        assert_eq!(single.voice, vec!["raid᲼night᲼voice".to_string()]);

        let many = formatter.resource_names("Raid Night", 3);
        assert_eq!(many.voice[0], "raid᲼night᲼voice 1");
        assert_eq!(many.voice[2], "raid᲼night᲼voice 3");
    }

    #[test]
    fn role_name_uses_configured_timezone() {
        let config = GuildConfig {
            timezone: "Europe/Amsterdam".into(),
            ..GuildConfig::default()
        };
        let formatter = NameFormatter::new(&config);
        let start = datetime!(2025-12-28 20:00 UTC);
        assert_eq!(
            formatter.role_name("Hero's Realm", start).unwrap(),
            "Hero's Realm Sun 28. Dec 21:00"
        );
    }

    #[test]
    fn find_role_requires_exact_name() {
        let config = GuildConfig::default();
        let formatter = NameFormatter::new(&config);
        let start = datetime!(2025-03-02 09:05 UTC);
        let roles = vec![
            GuildRole {
                id: RoleId::from(1),
                name: "Raid Sun 2. Mar 09:05 ".into(),
            },
            GuildRole {
                id: RoleId::from(2),
                name: "Raid Sun 2. Mar 09:05".into(),
            },
        ];
        assert_eq!(
            formatter.find_role(&roles, "Raid", start).unwrap(),
            RoleId::from(2)
        );
        assert!(matches!(
            formatter.find_role(&roles[..1], "Raid", start),
            Err(AttendanceCheckError::RoleNotFound(name)) if name == "Raid Sun 2. Mar 09:05"
        ));
    }

    #[test]
    fn messages_fill_known_placeholders_only() {
        let at = datetime!(2025-03-02 09:05 UTC);
        let text = render_message(
            "{role} {event} starts {time} {unknown}",
            Some(RoleId::from(7)),
            "Raid",
            at,
        );
        assert_eq!(
            text,
            format!("<@&7> Raid starts <t:{}:R> {{unknown}}", at.unix_timestamp())
        );
        assert_eq!(fill("{name}", &[("name", "{type}"), ("type", "x")]), "{type}");
    }
}
