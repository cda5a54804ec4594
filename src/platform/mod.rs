//! Chat platform abstraction: workspace provisioning and messaging.
//!
//! The onboarding core never talks to the chat platform directly. It goes
//! through two capabilities:
//!
//! - [`WorkspaceProvider`]: roles, private channels ("workspaces") and
//!   their visibility.
//! - [`Messenger`]: posting text/embeds, reactions, typing indicators.
//!
//! [`discord::DiscordRest`] implements both over the Discord HTTP API;
//! [`memory::MemoryGuild`] implements both in memory for local runs and tests.

pub mod discord;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

snowflake!(
    /// A platform user.
    UserId
);
snowflake!(
    /// A role within the community.
    RoleId
);
snowflake!(
    /// A channel or category.
    ChannelId
);
snowflake!(
    /// A posted message.
    MessageId
);

impl UserId {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl RoleId {
    pub fn mention(&self) -> String {
        format!("<@&{}>", self.0)
    }
}

impl ChannelId {
    pub fn mention(&self) -> String {
        format!("<#{}>", self.0)
    }
}

/// A community member: identity plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub name: String,
}

impl Member {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn mention(&self) -> String {
        self.id.mention()
    }
}

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    /// The community-wide default role.
    Everyone,
    Role(RoleId),
    Member(UserId),
}

/// Access granted to a principal on a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Explicitly denied view access.
    Hidden,
    /// View only.
    Visible,
    /// View, read history and send messages.
    ReadWrite,
}

/// A permission overwrite applied when creating a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overwrite {
    pub principal: Principal,
    pub access: Access,
}

impl Overwrite {
    pub fn new(principal: Principal, access: Access) -> Self {
        Self { principal, access }
    }
}

/// A role as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

/// A workspace (channel) as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub id: ChannelId,
    pub name: String,
}

/// Rich message used for audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    /// RGB colour.
    pub color: u32,
}

/// Provisioning of roles and private workspaces.
///
/// Every call may fail with a [`ProviderError`]; callers decide whether to
/// continue. Only the bulk reset tolerates failures (per resource).
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Look up a member by id.
    async fn member(&self, user: UserId) -> Result<Member, ProviderError>;

    async fn assign_role(&self, user: UserId, role: RoleId) -> Result<(), ProviderError>;

    async fn create_role(&self, name: &str) -> Result<RoleId, ProviderError>;

    async fn delete_role(&self, role: RoleId) -> Result<(), ProviderError>;

    async fn list_roles(&self) -> Result<Vec<RoleInfo>, ProviderError>;

    /// Create a private text workspace under `parent` with the given overwrites.
    async fn create_workspace(
        &self,
        name: &str,
        parent: ChannelId,
        overwrites: &[Overwrite],
    ) -> Result<ChannelId, ProviderError>;

    async fn delete_workspace(&self, workspace: ChannelId) -> Result<(), ProviderError>;

    /// List the workspaces under a parent area.
    async fn list_workspaces(&self, parent: ChannelId) -> Result<Vec<WorkspaceInfo>, ProviderError>;

    async fn set_workspace_visibility(
        &self,
        workspace: ChannelId,
        principal: Principal,
        visible: bool,
    ) -> Result<(), ProviderError>;
}

/// Posting into channels.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, channel: ChannelId, content: &str)
    -> Result<MessageId, ProviderError>;

    async fn send_embed(&self, channel: ChannelId, embed: &Embed)
    -> Result<MessageId, ProviderError>;

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), ProviderError>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId)
    -> Result<(), ProviderError>;

    /// Show a typing indicator in the channel.
    async fn trigger_typing(&self, channel: ChannelId) -> Result<(), ProviderError>;
}
