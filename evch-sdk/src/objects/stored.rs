//! Persisted per-guild state layout.
//!
//! ```text
//! { guildId: { eventId: { text: channelId, voice: [channelId, ...], role: roleId } } }
//! ```
//!
//! Older deployments wrote `voice` as a single id. That form is still read
//! and is normalised to a one-element list; it is never written.

use super::ids::{ChannelId, EventId, GuildId, RoleId};
use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Resources recorded for one provisioned event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    #[serde(default)]
    pub text: Option<ChannelId>,
    #[serde(default, deserialize_with = "voice_ids")]
    pub voice: SmallVec<[ChannelId; 4]>,
    #[serde(default)]
    pub role: Option<RoleId>,
}

/// Stored events of a single guild, keyed by event id.
pub type GuildState = BTreeMap<EventId, StoredEvent>;

/// The whole persisted document, keyed by guild id.
pub type StateDocument = BTreeMap<GuildId, GuildState>;

#[derive(Deserialize)]
#[serde(untagged)]
enum VoiceField {
    Legacy(ChannelId),
    List(SmallVec<[ChannelId; 4]>),
}

fn voice_ids<'de, D>(deserializer: D) -> Result<SmallVec<[ChannelId; 4]>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<VoiceField>::deserialize(deserializer)? {
        Some(VoiceField::Legacy(id)) => smallvec::smallvec![id],
        Some(VoiceField::List(ids)) => ids,
        None => SmallVec::new(),
    })
}
