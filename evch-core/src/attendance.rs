//! Attendance evaluation.
//!
//! Gating (minimum attendance) and scaling (voice multipliers) are configured
//! independently; each list is matched on its own, first match wins.

use evch_sdk::config::{MinimumAttendanceRule, VoiceMultiplierRule, first_match};

/// Outcome of an attendance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub member_count: u32,
    /// Threshold of the matched minimum rule, `None` when the event is not gated.
    pub required_minimum: Option<u32>,
    pub meets_minimum: bool,
    /// Number of voice channels to create. Always at least one.
    pub channel_count: u32,
    /// User limit per voice channel, `None` for no cap.
    pub per_channel_limit: Option<u32>,
}

pub fn evaluate(
    member_count: u32,
    event_name: &str,
    multipliers: &[VoiceMultiplierRule],
    minimums: &[MinimumAttendanceRule],
) -> Decision {
    let required_minimum = first_match(minimums, event_name).map(|rule| rule.minimum);
    let multiplier = first_match(multipliers, event_name)
        .map(|rule| rule.multiplier)
        .filter(|&m| m > 0);

    Decision {
        member_count,
        required_minimum,
        meets_minimum: required_minimum.is_none_or(|minimum| member_count >= minimum),
        channel_count: multiplier.map_or(1, |m| (member_count / m).max(1)),
        per_channel_limit: multiplier.map(|m| m + 1),
    }
}
