//! Ordered keyword rules.
//!
//! Rules are kept as ordered lists rather than maps: the first rule whose
//! keyword occurs in the event name (case-insensitively) wins, regardless of
//! how long or specific later keywords are.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A rule selected by a keyword contained in the event name.
pub trait KeywordRule {
    fn keyword(&self) -> &str;

    /// Case-insensitive substring match against the event name.
    fn matches(&self, event_name: &str) -> bool {
        event_name
            .to_lowercase()
            .contains(&self.keyword().to_lowercase())
    }
}

/// Scales voice channels: one channel per `multiplier` role members, each
/// capped at `multiplier + 1` users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMultiplierRule {
    pub keyword: CompactString,
    pub multiplier: u32,
}

/// Gates provisioning on a minimum number of role members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumAttendanceRule {
    pub keyword: CompactString,
    pub minimum: u32,
}

impl KeywordRule for VoiceMultiplierRule {
    fn keyword(&self) -> &str {
        &self.keyword
    }
}

impl KeywordRule for MinimumAttendanceRule {
    fn keyword(&self) -> &str {
        &self.keyword
    }
}

/// Returns the first rule, in configured order, matching `event_name`.
pub fn first_match<'a, R: KeywordRule>(rules: &'a [R], event_name: &str) -> Option<&'a R> {
    rules.iter().find(|rule| rule.matches(event_name))
}
