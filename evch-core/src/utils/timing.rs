//! Timing policy for the event lifecycle.
//!
//! All lifecycle deadlines are derived here from the event start time and the
//! guild configuration, so the orchestrator never does date arithmetic inline.

use evch_sdk::config::GuildConfig;
use smallvec::SmallVec;
use time::{Duration, OffsetDateTime};

/// Lead time of the deletion warning.
pub const WARNING_LEAD: Duration = Duration::minutes(15);

/// How far a single extension postpones deletion.
pub const EXTENSION: Duration = Duration::hours(4);

/// The warning is only posted when the text channel saw activity this
/// recently.
pub const ACTIVITY_WINDOW: Duration = Duration::minutes(15);

/// Attendance checkpoints: the creation time followed by one entry per
/// configured retry offset.
pub type Checkpoints = SmallVec<[OffsetDateTime; 4]>;

/// When the resources of an event starting at `start` are deleted.
pub fn delete_time(start: OffsetDateTime, deletion_hours: u32) -> OffsetDateTime {
    start + Duration::hours(i64::from(deletion_hours))
}

pub fn warning_time(delete_at: OffsetDateTime) -> OffsetDateTime {
    delete_at - WARNING_LEAD
}

pub fn extended_delete_time(delete_at: OffsetDateTime) -> OffsetDateTime {
    delete_at + EXTENSION
}

/// When the first attendance check of an event runs.
pub fn creation_time(start: OffsetDateTime, config: &GuildConfig) -> OffsetDateTime {
    start - Duration::minutes(i64::from(config.creation_minutes))
}

/// Build the checkpoint list for an event.
///
/// Retry offsets are absolute minutes before start. They do not depend on
/// the creation offset, so a checkpoint may precede the creation time.
pub fn checkpoint_times(start: OffsetDateTime, config: &GuildConfig) -> Checkpoints {
    std::iter::once(creation_time(start, config))
        .chain(
            config
                .retry_offsets
                .iter()
                .map(|&minutes| start - Duration::minutes(i64::from(minutes))),
        )
        .collect()
}

/// Pick the checkpoint to evaluate after checkpoint `failed` did not pass.
///
/// Returns the first later checkpoint that is still in the future. When every
/// later checkpoint has already elapsed, the final one is returned so the last
/// evaluation still runs (immediately). `None` means `failed` was the final
/// checkpoint and the event is abandoned.
pub fn next_checkpoint(
    checkpoints: &[OffsetDateTime],
    failed: usize,
    now: OffsetDateTime,
) -> Option<usize> {
    let last = checkpoints.len().checked_sub(1)?;
    if failed >= last {
        return None;
    }
    (failed + 1..=last)
        .find(|&index| checkpoints[index] > now)
        .or(Some(last))
}

/// Whether activity at `last_activity` is recent enough to warrant the
/// deletion warning at `now`.
pub fn is_recent_activity(last_activity: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    last_activity.is_some_and(|at| now - at <= ACTIVITY_WINDOW)
}
