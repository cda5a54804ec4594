//! Discord REST provider: workspace provisioning and messaging over the
//! Discord HTTP API (v10).
//!
//! Gateway event delivery is not handled here; events arrive through
//! `POST /api/events` from an external gateway relay.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, RETRY_AFTER};
use reqwest::{Method, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    Access, ChannelId, Embed, Member, MessageId, Messenger, Overwrite, Principal, RoleId,
    RoleInfo, UserId, WorkspaceInfo, WorkspaceProvider,
};
use crate::error::ProviderError;

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const VIEW_CHANNEL: u64 = 1 << 10;
const SEND_MESSAGES: u64 = 1 << 11;
const READ_MESSAGE_HISTORY: u64 = 1 << 16;

/// Channel type for guild text channels.
const GUILD_TEXT: u8 = 0;

/// Discord HTTP client bound to one guild.
pub struct DiscordRest {
    token: SecretString,
    guild_id: u64,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct RawRole {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct RawChannel {
    id: String,
    name: Option<String>,
    parent_id: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    username: String,
    global_name: Option<String>,
}

#[derive(Deserialize)]
struct RawMember {
    user: RawUser,
    nick: Option<String>,
}

impl DiscordRest {
    pub fn new(token: SecretString, guild_id: u64) -> Self {
        Self {
            token,
            guild_id,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API root (e.g. a local proxy).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        build_url(&self.api_base, segments)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
        action: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = self.url(segments)?;
        let mut req = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bot {}", self.token.expose_secret()));
        req = match body {
            Some(body) => req.json(&body),
            None => req.header(CONTENT_LENGTH, 0),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), action, "Discord request failed");
        Err(error_for_status(status.as_u16(), retry_after, body, action))
    }

    async fn json<T: for<'de> Deserialize<'de>>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ProviderError> {
        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn guild(&self) -> String {
        self.guild_id.to_string()
    }
}

fn build_url(base: &str, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url =
        Url::parse(base).map_err(|e| ProviderError::InvalidResponse(format!("bad API base: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::InvalidResponse("API base cannot be a base URL".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn error_for_status(status: u16, retry_after: Option<f64>, body: String, action: &str) -> ProviderError {
    match status {
        403 => ProviderError::Forbidden {
            action: action.to_string(),
        },
        404 => ProviderError::NotFound {
            what: action.to_string(),
        },
        429 => ProviderError::RateLimited {
            retry_after: retry_after.map(std::time::Duration::from_secs_f64),
        },
        _ => ProviderError::Api { status, body },
    }
}

fn parse_id(raw: &str) -> Result<u64, ProviderError> {
    raw.parse()
        .map_err(|_| ProviderError::InvalidResponse(format!("invalid snowflake: {raw}")))
}

/// Allow/deny bitsets for an access level.
fn permission_bits(access: Access) -> (u64, u64) {
    match access {
        Access::Hidden => (0, VIEW_CHANNEL),
        Access::Visible => (VIEW_CHANNEL, 0),
        Access::ReadWrite => (VIEW_CHANNEL | SEND_MESSAGES | READ_MESSAGE_HISTORY, 0),
    }
}

/// Target id and overwrite type (0 = role, 1 = member) for a principal.
fn principal_target(guild_id: u64, principal: Principal) -> (u64, u8) {
    match principal {
        Principal::Everyone => (guild_id, 0),
        Principal::Role(role) => (role.0, 0),
        Principal::Member(user) => (user.0, 1),
    }
}

fn overwrite_payload(guild_id: u64, overwrite: &Overwrite) -> Value {
    let (id, kind) = principal_target(guild_id, overwrite.principal);
    let (allow, deny) = permission_bits(overwrite.access);
    json!({
        "id": id.to_string(),
        "type": kind,
        "allow": allow.to_string(),
        "deny": deny.to_string(),
    })
}

#[async_trait]
impl WorkspaceProvider for DiscordRest {
    async fn member(&self, user: UserId) -> Result<Member, ProviderError> {
        let guild = self.guild();
        let user_str = user.to_string();
        let resp = self
            .request(
                Method::GET,
                &["guilds", &guild, "members", &user_str],
                None,
                &format!("fetch member {user}"),
            )
            .await?;
        let raw: RawMember = self.json(resp).await?;
        let name = raw
            .nick
            .or(raw.user.global_name)
            .unwrap_or(raw.user.username);
        Ok(Member::new(UserId(parse_id(&raw.user.id)?), name))
    }

    async fn assign_role(&self, user: UserId, role: RoleId) -> Result<(), ProviderError> {
        let guild = self.guild();
        let (user_str, role_str) = (user.to_string(), role.to_string());
        self.request(
            Method::PUT,
            &["guilds", &guild, "members", &user_str, "roles", &role_str],
            None,
            &format!("assign role {role} to {user}"),
        )
        .await?;
        Ok(())
    }

    async fn create_role(&self, name: &str) -> Result<RoleId, ProviderError> {
        let guild = self.guild();
        let resp = self
            .request(
                Method::POST,
                &["guilds", &guild, "roles"],
                Some(json!({ "name": name })),
                &format!("create role {name}"),
            )
            .await?;
        let created: IdOnly = self.json(resp).await?;
        Ok(RoleId(parse_id(&created.id)?))
    }

    async fn delete_role(&self, role: RoleId) -> Result<(), ProviderError> {
        let guild = self.guild();
        let role_str = role.to_string();
        self.request(
            Method::DELETE,
            &["guilds", &guild, "roles", &role_str],
            None,
            &format!("delete role {role}"),
        )
        .await?;
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<RoleInfo>, ProviderError> {
        let guild = self.guild();
        let resp = self
            .request(Method::GET, &["guilds", &guild, "roles"], None, "list roles")
            .await?;
        let raw: Vec<RawRole> = self.json(resp).await?;
        raw.into_iter()
            .map(|r| {
                Ok(RoleInfo {
                    id: RoleId(parse_id(&r.id)?),
                    name: r.name,
                })
            })
            .collect()
    }

    async fn create_workspace(
        &self,
        name: &str,
        parent: ChannelId,
        overwrites: &[Overwrite],
    ) -> Result<ChannelId, ProviderError> {
        let guild = self.guild();
        let permission_overwrites: Vec<Value> = overwrites
            .iter()
            .map(|o| overwrite_payload(self.guild_id, o))
            .collect();
        let resp = self
            .request(
                Method::POST,
                &["guilds", &guild, "channels"],
                Some(json!({
                    "name": name,
                    "type": GUILD_TEXT,
                    "parent_id": parent.to_string(),
                    "permission_overwrites": permission_overwrites,
                })),
                &format!("create workspace {name}"),
            )
            .await?;
        let created: IdOnly = self.json(resp).await?;
        Ok(ChannelId(parse_id(&created.id)?))
    }

    async fn delete_workspace(&self, workspace: ChannelId) -> Result<(), ProviderError> {
        let ws = workspace.to_string();
        self.request(
            Method::DELETE,
            &["channels", &ws],
            None,
            &format!("delete workspace {workspace}"),
        )
        .await?;
        Ok(())
    }

    async fn list_workspaces(&self, parent: ChannelId) -> Result<Vec<WorkspaceInfo>, ProviderError> {
        let guild = self.guild();
        let resp = self
            .request(Method::GET, &["guilds", &guild, "channels"], None, "list channels")
            .await?;
        let raw: Vec<RawChannel> = self.json(resp).await?;
        let parent_str = parent.to_string();
        raw.into_iter()
            .filter(|c| c.parent_id.as_deref() == Some(parent_str.as_str()))
            .map(|c| {
                Ok(WorkspaceInfo {
                    id: ChannelId(parse_id(&c.id)?),
                    name: c.name.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn set_workspace_visibility(
        &self,
        workspace: ChannelId,
        principal: Principal,
        visible: bool,
    ) -> Result<(), ProviderError> {
        let access = if visible {
            Access::Visible
        } else {
            Access::Hidden
        };
        let mut payload = overwrite_payload(self.guild_id, &Overwrite::new(principal, access));
        let target = payload["id"].as_str().unwrap_or_default().to_string();
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("id");
        }
        let ws = workspace.to_string();
        self.request(
            Method::PUT,
            &["channels", &ws, "permissions", &target],
            Some(payload),
            &format!("set visibility on {workspace}"),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Messenger for DiscordRest {
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageId, ProviderError> {
        let ch = channel.to_string();
        let resp = self
            .request(
                Method::POST,
                &["channels", &ch, "messages"],
                Some(json!({ "content": content })),
                &format!("send message to {channel}"),
            )
            .await?;
        let sent: IdOnly = self.json(resp).await?;
        Ok(MessageId(parse_id(&sent.id)?))
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<MessageId, ProviderError> {
        let ch = channel.to_string();
        let resp = self
            .request(
                Method::POST,
                &["channels", &ch, "messages"],
                Some(json!({
                    "embeds": [{
                        "title": embed.title,
                        "description": embed.description,
                        "color": embed.color,
                    }]
                })),
                &format!("send embed to {channel}"),
            )
            .await?;
        let sent: IdOnly = self.json(resp).await?;
        Ok(MessageId(parse_id(&sent.id)?))
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), ProviderError> {
        let (ch, msg) = (channel.to_string(), message.to_string());
        self.request(
            Method::PUT,
            &["channels", &ch, "messages", &msg, "reactions", emoji, "@me"],
            None,
            &format!("react to {message}"),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), ProviderError> {
        let (ch, msg) = (channel.to_string(), message.to_string());
        self.request(
            Method::DELETE,
            &["channels", &ch, "messages", &msg],
            None,
            &format!("delete message {message}"),
        )
        .await?;
        Ok(())
    }

    async fn trigger_typing(&self, channel: ChannelId) -> Result<(), ProviderError> {
        let ch = channel.to_string();
        self.request(
            Method::POST,
            &["channels", &ch, "typing"],
            None,
            &format!("trigger typing in {channel}"),
        )
        .await?;
        Ok(())
    }
}
