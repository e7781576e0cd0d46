//! HTTP client for the companion gateway process.
//!
//! The gateway owns the chat platform connection. This daemon asks it for
//! roles and member counts, tells it which channels to create, rename, lock
//! and delete, and posts messages through it. Every call is JSON over HTTP
//! with a bearer token.

use crate::config::file::GatewayConfig;
use async_trait::async_trait;
use evch_core::backend::{
    AttendanceCheckError, GuildRole, MemberCount, MembershipLookup, NotificationBackend,
    NotificationError, ProvisionRequest, ProvisioningBackend, ProvisioningError, ResourceAccess,
    ResourceNames,
};
use evch_core::registry::EventResources;
use evch_sdk::objects::{ChannelId, GuildId, RoleId, ScheduledEvent};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid gateway url: {0}")]
    Url(#[from] url::ParseError),

    #[error("gateway answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl From<GatewayError> for AttendanceCheckError {
    fn from(e: GatewayError) -> Self {
        AttendanceCheckError::LookupFailed(e.to_string())
    }
}

impl From<GatewayError> for ProvisioningError {
    fn from(e: GatewayError) -> Self {
        match e {
            // 207: some channels exist, the rest failed.
            GatewayError::Status { status, body } if status == StatusCode::MULTI_STATUS => {
                ProvisioningError::Partial(body)
            }
            GatewayError::Status { status, body } => ProvisioningError::Rejected {
                status: status.as_u16(),
                message: body,
            },
            other => ProvisioningError::Unavailable(other.to_string()),
        }
    }
}

impl From<GatewayError> for NotificationError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Status { status, body } => NotificationError::Rejected {
                status: status.as_u16(),
                message: body,
            },
            other => NotificationError::Unavailable(other.to_string()),
        }
    }
}

/// Channels of an event, without the shared divider.
#[derive(Serialize)]
struct EventChannels {
    text: Option<ChannelId>,
    voice: SmallVec<[ChannelId; 4]>,
}

impl From<&EventResources> for EventChannels {
    fn from(resources: &EventResources) -> Self {
        Self {
            text: resources.text,
            voice: resources.voice.clone(),
        }
    }
}

#[derive(Serialize)]
struct RenameBody<'a> {
    channels: EventChannels,
    names: &'a ResourceNames,
}

#[derive(Serialize)]
struct AccessBody<'a> {
    channels: EventChannels,
    access: &'a ResourceAccess,
}

#[derive(Serialize)]
struct DividerBody<'a> {
    category: Option<ChannelId>,
    name: &'a str,
}

#[derive(Deserialize)]
struct DividerResponse {
    channel: ChannelId,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct ActivityResponse {
    #[serde(default, with = "time::serde::timestamp::option")]
    last_message_at: Option<OffsetDateTime>,
}

/// Implements every collaborator trait against the gateway.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let mut base_url = config.base_url.clone();
        // Relative joins replace the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            token: config.token.clone(),
        }
    }

    /// The current scheduled events of a guild, used to resume after a restart.
    pub async fn scheduled_events(
        &self,
        guild: GuildId,
    ) -> Result<Vec<ScheduledEvent>, GatewayError> {
        let url = self.url(&format!("guilds/{guild}/scheduled-events"))?;
        self.json(self.http.get(url)).await
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.base_url.join(path)?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() && status != StatusCode::MULTI_STATUS {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(GatewayError::Status { status, body })
        }
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        Ok(self.send(request).await?.json().await?)
    }

    async fn empty(&self, request: RequestBuilder) -> Result<(), GatewayError> {
        self.send(request).await.map(drop)
    }
}

#[async_trait]
impl MembershipLookup for GatewayClient {
    async fn guild_roles(&self, guild: GuildId) -> Result<Vec<GuildRole>, AttendanceCheckError> {
        let url = self.url(&format!("guilds/{guild}/roles"))?;
        Ok(self.json(self.http.get(url)).await?)
    }

    async fn member_count(
        &self,
        guild: GuildId,
        role: RoleId,
    ) -> Result<MemberCount, AttendanceCheckError> {
        let url = self.url(&format!("guilds/{guild}/roles/{role}/member-count"))?;
        Ok(self.json(self.http.get(url)).await?)
    }
}

#[async_trait]
impl ProvisioningBackend for GatewayClient {
    async fn create(&self, request: &ProvisionRequest) -> Result<EventResources, ProvisioningError> {
        let url = self.url(&format!("guilds/{}/event-channels", request.guild))?;
        Ok(self.json(self.http.post(url).json(request)).await?)
    }

    async fn rename(
        &self,
        guild: GuildId,
        resources: &EventResources,
        names: &ResourceNames,
    ) -> Result<(), ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/event-channels/rename"))?;
        let body = RenameBody {
            channels: resources.into(),
            names,
        };
        Ok(self.empty(self.http.post(url).json(&body)).await?)
    }

    async fn lock(
        &self,
        guild: GuildId,
        resources: &EventResources,
        access: &ResourceAccess,
    ) -> Result<(), ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/event-channels/lock"))?;
        let body = AccessBody {
            channels: resources.into(),
            access,
        };
        Ok(self.empty(self.http.post(url).json(&body)).await?)
    }

    async fn unlock(
        &self,
        guild: GuildId,
        resources: &EventResources,
        access: &ResourceAccess,
    ) -> Result<(), ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/event-channels/unlock"))?;
        let body = AccessBody {
            channels: resources.into(),
            access,
        };
        Ok(self.empty(self.http.post(url).json(&body)).await?)
    }

    async fn delete(
        &self,
        guild: GuildId,
        resources: &EventResources,
    ) -> Result<(), ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/event-channels/delete"))?;
        let body = EventChannels::from(resources);
        Ok(self.empty(self.http.post(url).json(&body)).await?)
    }

    async fn delete_role(&self, guild: GuildId, role: RoleId) -> Result<(), ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/roles/{role}"))?;
        match self.empty(self.http.delete(url)).await {
            Err(GatewayError::Status { status, .. }) if status == StatusCode::NOT_FOUND => Ok(()),
            other => Ok(other?),
        }
    }

    async fn ensure_divider(
        &self,
        guild: GuildId,
        category: Option<ChannelId>,
        name: &str,
    ) -> Result<ChannelId, ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/divider"))?;
        let body = DividerBody { category, name };
        let response: DividerResponse = self.json(self.http.put(url).json(&body)).await?;
        Ok(response.channel)
    }

    async fn set_divider_access(
        &self,
        guild: GuildId,
        divider: ChannelId,
        role: RoleId,
        visible: bool,
    ) -> Result<(), ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/divider/{divider}/roles/{role}"))?;
        let request = if visible {
            self.http.put(url)
        } else {
            self.http.delete(url)
        };
        Ok(self.empty(request).await?)
    }

    async fn delete_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<(), ProvisioningError> {
        let url = self.url(&format!("guilds/{guild}/channels/{channel}"))?;
        match self.empty(self.http.delete(url)).await {
            Err(GatewayError::Status { status, .. }) if status == StatusCode::NOT_FOUND => Ok(()),
            other => Ok(other?),
        }
    }
}

#[async_trait]
impl NotificationBackend for GatewayClient {
    async fn post(
        &self,
        guild: GuildId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), NotificationError> {
        let url = self.url(&format!("guilds/{guild}/channels/{channel}/messages"))?;
        let body = MessageBody { content: text };
        Ok(self.empty(self.http.post(url).json(&body)).await?)
    }

    async fn last_activity(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<OffsetDateTime>, NotificationError> {
        let url = self.url(&format!("guilds/{guild}/channels/{channel}/activity"))?;
        let response: ActivityResponse = self.json(self.http.get(url)).await?;
        Ok(response.last_message_at)
    }
}
