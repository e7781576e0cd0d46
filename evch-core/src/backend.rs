//! Collaborator contracts.
//!
//! The lifecycle never talks to the chat platform directly. Membership
//! lookups, resource provisioning and message delivery go through these
//! traits; all of them are fallible and none are transactional.

use crate::registry::EventResources;
use async_trait::async_trait;
use evch_sdk::config::ConfigurationError;
use evch_sdk::objects::{ChannelId, GuildId, RoleId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// A role as listed by the membership collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRole {
    pub id: RoleId,
    pub name: String,
}

/// Number of members holding a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCount {
    pub count: u32,
    /// `false` when the platform's member cache may be incomplete.
    pub reliable: bool,
}

/// Everything needed to create the resources of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub guild: GuildId,
    pub category: Option<ChannelId>,
    pub role: RoleId,
    pub whitelisted_roles: Vec<RoleId>,
    pub names: ResourceNames,
    /// User limit for every voice channel.
    pub user_limit: Option<u32>,
}

/// Rendered channel names of an event, voice names in channel order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNames {
    pub text: String,
    pub voice: Vec<String>,
}

/// Roles whose access is changed by lock/unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAccess {
    pub role: Option<RoleId>,
    pub whitelisted_roles: Vec<RoleId>,
}

#[derive(Debug, Error)]
pub enum AttendanceCheckError {
    #[error("no role named '{0}' exists yet")]
    RoleNotFound(String),

    #[error("member lookup failed: {0}")]
    LookupFailed(String),

    #[error("start time {0} cannot be rendered")]
    UnrenderableTime(OffsetDateTime),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The backend refused the request.
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Some resources were created before the failure.
    #[error("partially applied: {0}")]
    Partial(String),
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("notification backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn guild_roles(&self, guild: GuildId) -> Result<Vec<GuildRole>, AttendanceCheckError>;

    async fn member_count(
        &self,
        guild: GuildId,
        role: RoleId,
    ) -> Result<MemberCount, AttendanceCheckError>;
}

#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Create the text channel and voice channels of an event.
    async fn create(&self, request: &ProvisionRequest) -> Result<EventResources, ProvisioningError>;

    async fn rename(
        &self,
        guild: GuildId,
        resources: &EventResources,
        names: &ResourceNames,
    ) -> Result<(), ProvisioningError>;

    /// Make the resources read-only for the event role and whitelisted roles.
    async fn lock(
        &self,
        guild: GuildId,
        resources: &EventResources,
        access: &ResourceAccess,
    ) -> Result<(), ProvisioningError>;

    async fn unlock(
        &self,
        guild: GuildId,
        resources: &EventResources,
        access: &ResourceAccess,
    ) -> Result<(), ProvisioningError>;

    /// Delete the text and voice channels. The divider is never touched.
    async fn delete(
        &self,
        guild: GuildId,
        resources: &EventResources,
    ) -> Result<(), ProvisioningError>;

    async fn delete_role(&self, guild: GuildId, role: RoleId) -> Result<(), ProvisioningError>;

    /// Find or create the divider channel.
    async fn ensure_divider(
        &self,
        guild: GuildId,
        category: Option<ChannelId>,
        name: &str,
    ) -> Result<ChannelId, ProvisioningError>;

    async fn set_divider_access(
        &self,
        guild: GuildId,
        divider: ChannelId,
        role: RoleId,
        visible: bool,
    ) -> Result<(), ProvisioningError>;

    async fn delete_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<(), ProvisioningError>;
}

#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn post(
        &self,
        guild: GuildId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), NotificationError>;

    /// Time of the most recent message in the channel, if any.
    async fn last_activity(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<OffsetDateTime>, NotificationError>;
}
