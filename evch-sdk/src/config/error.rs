use thiserror::Error;

/// A rejected guild configuration.
///
/// This is the only lifecycle error that is ever shown to whoever edits the
/// configuration; it is raised when the configuration is written and never
/// reaches the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("creation offset of {0} minutes exceeds the 1440 minute maximum")]
    CreationOffsetTooLarge(u32),

    #[error("deletion offset must be at least one hour")]
    DeletionOffsetTooSmall,

    #[error("multiplier {multiplier} for keyword '{keyword}' is outside 1..=99")]
    MultiplierOutOfRange { keyword: String, multiplier: u32 },

    #[error("minimum {minimum} for keyword '{keyword}' is outside 1..=999")]
    MinimumOutOfRange { keyword: String, minimum: u32 },

    #[error("minimum attendance rule '{0}' has no voice multiplier rule with the same keyword")]
    MinimumWithoutMultiplier(String),

    #[error("rule keywords must not be empty")]
    EmptyKeyword,

    #[error("keyword '{0}' is configured more than once")]
    DuplicateKeyword(String),

    #[error("channel name limit {0} is outside 1..=100")]
    ChannelNameLimitOutOfRange(usize),

    #[error("channel name delimiter '{0}' is longer than 5 characters")]
    DelimiterTooLong(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("retry offset of {0} minutes exceeds the 1440 minute maximum")]
    RetryOffsetTooLarge(u32),

    #[error("retry offsets must be strictly descending minutes before start")]
    RetryOffsetsNotDescending,
}
