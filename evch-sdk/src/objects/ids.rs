//! Snowflake identifiers.
//!
//! Each id is a transparent `u64` newtype so that ids of different kinds
//! cannot be mixed up. They serialize as plain numbers, and as strings
//! when used as JSON object keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

snowflake!(
    /// A guild (server) scope.
    GuildId
);
snowflake!(
    /// An externally scheduled event.
    EventId
);
snowflake!(
    /// A guild role.
    RoleId
);
snowflake!(
    /// A text, voice or divider channel.
    ChannelId
);

impl RoleId {
    /// Mention markup that pings every member of the role.
    pub fn mention(self) -> String {
        format!("<@&{}>", self.0)
    }
}
