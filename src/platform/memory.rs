//! In-memory guild: a complete [`WorkspaceProvider`] + [`Messenger`] held in
//! process memory. Used for local dry runs and by the test suite.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    Access, ChannelId, Embed, Member, MessageId, Messenger, Overwrite, Principal, RoleId,
    RoleInfo, UserId, WorkspaceInfo, WorkspaceProvider,
};
use crate::error::ProviderError;

/// A message posted through the [`Messenger`] side.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub content: String,
    pub embed: Option<Embed>,
    pub reactions: Vec<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
struct WorkspaceRecord {
    name: String,
    parent: ChannelId,
    access: HashMap<Principal, Access>,
}

#[derive(Debug, Default)]
struct GuildState {
    next_id: u64,
    members: HashMap<UserId, Member>,
    member_roles: HashMap<UserId, HashSet<RoleId>>,
    roles: BTreeMap<RoleId, String>,
    protected_roles: HashSet<RoleId>,
    workspaces: BTreeMap<ChannelId, WorkspaceRecord>,
    messages: Vec<PostedMessage>,
    typing: usize,
    fail_workspace_creation: bool,
}

impl GuildState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory community.
pub struct MemoryGuild {
    state: Mutex<GuildState>,
}

impl MemoryGuild {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GuildState {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    /// Register a member so it can be looked up.
    pub async fn add_member(&self, member: Member) {
        let mut state = self.state.lock().await;
        state.member_roles.entry(member.id).or_default();
        state.members.insert(member.id, member);
    }

    /// Create a role directly (community setup).
    pub async fn add_role(&self, name: &str) -> RoleId {
        let mut state = self.state.lock().await;
        let id = RoleId(state.next_id());
        state.roles.insert(id, name.to_string());
        id
    }

    /// Make a role undeletable, as if the agent lacked permission.
    pub async fn protect_role(&self, role: RoleId) {
        self.state.lock().await.protected_roles.insert(role);
    }

    /// Make every subsequent workspace creation fail.
    pub async fn fail_workspace_creation(&self, fail: bool) {
        self.state.lock().await.fail_workspace_creation = fail;
    }

    /// Create a category/area id without any workspace record.
    pub async fn add_area(&self) -> ChannelId {
        ChannelId(self.state.lock().await.next_id())
    }

    pub async fn roles_of(&self, user: UserId) -> HashSet<RoleId> {
        self.state
            .lock()
            .await
            .member_roles
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn roles(&self) -> Vec<RoleInfo> {
        self.state
            .lock()
            .await
            .roles
            .iter()
            .map(|(id, name)| RoleInfo {
                id: *id,
                name: name.clone(),
            })
            .collect()
    }

    pub async fn has_role(&self, role: RoleId) -> bool {
        self.state.lock().await.roles.contains_key(&role)
    }

    pub async fn has_workspace(&self, workspace: ChannelId) -> bool {
        self.state.lock().await.workspaces.contains_key(&workspace)
    }

    pub async fn workspace_name(&self, workspace: ChannelId) -> Option<String> {
        self.state
            .lock()
            .await
            .workspaces
            .get(&workspace)
            .map(|w| w.name.clone())
    }

    pub async fn workspace_access(
        &self,
        workspace: ChannelId,
        principal: Principal,
    ) -> Option<Access> {
        self.state
            .lock()
            .await
            .workspaces
            .get(&workspace)
            .and_then(|w| w.access.get(&principal).copied())
    }

    /// All non-deleted messages in a channel, oldest first.
    pub async fn messages_in(&self, channel: ChannelId) -> Vec<PostedMessage> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.channel == channel && !m.deleted)
            .cloned()
            .collect()
    }

    /// Number of typing indicators triggered so far.
    pub async fn typing_count(&self) -> usize {
        self.state.lock().await.typing
    }
}

impl Default for MemoryGuild {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkspaceProvider for MemoryGuild {
    async fn member(&self, user: UserId) -> Result<Member, ProviderError> {
        self.state
            .lock()
            .await
            .members
            .get(&user)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                what: format!("member {user}"),
            })
    }

    async fn assign_role(&self, user: UserId, role: RoleId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if !state.roles.contains_key(&role) {
            return Err(ProviderError::NotFound {
                what: format!("role {role}"),
            });
        }
        state.member_roles.entry(user).or_default().insert(role);
        Ok(())
    }

    async fn create_role(&self, name: &str) -> Result<RoleId, ProviderError> {
        let mut state = self.state.lock().await;
        let id = RoleId(state.next_id());
        state.roles.insert(id, name.to_string());
        Ok(id)
    }

    async fn delete_role(&self, role: RoleId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.protected_roles.contains(&role) {
            return Err(ProviderError::Forbidden {
                action: format!("delete role {role}"),
            });
        }
        if state.roles.remove(&role).is_none() {
            return Err(ProviderError::NotFound {
                what: format!("role {role}"),
            });
        }
        for roles in state.member_roles.values_mut() {
            roles.remove(&role);
        }
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<RoleInfo>, ProviderError> {
        Ok(self.roles().await)
    }

    async fn create_workspace(
        &self,
        name: &str,
        parent: ChannelId,
        overwrites: &[Overwrite],
    ) -> Result<ChannelId, ProviderError> {
        let mut state = self.state.lock().await;
        if state.fail_workspace_creation {
            return Err(ProviderError::Forbidden {
                action: format!("create workspace {name}"),
            });
        }
        let id = ChannelId(state.next_id());
        let access = overwrites
            .iter()
            .map(|o| (o.principal, o.access))
            .collect();
        state.workspaces.insert(
            id,
            WorkspaceRecord {
                name: name.to_string(),
                parent,
                access,
            },
        );
        Ok(id)
    }

    async fn delete_workspace(&self, workspace: ChannelId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state
            .workspaces
            .remove(&workspace)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound {
                what: format!("workspace {workspace}"),
            })
    }

    async fn list_workspaces(&self, parent: ChannelId) -> Result<Vec<WorkspaceInfo>, ProviderError> {
        Ok(self
            .state
            .lock()
            .await
            .workspaces
            .iter()
            .filter(|(_, w)| w.parent == parent)
            .map(|(id, w)| WorkspaceInfo {
                id: *id,
                name: w.name.clone(),
            })
            .collect())
    }

    async fn set_workspace_visibility(
        &self,
        workspace: ChannelId,
        principal: Principal,
        visible: bool,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        let record = state
            .workspaces
            .get_mut(&workspace)
            .ok_or_else(|| ProviderError::NotFound {
                what: format!("workspace {workspace}"),
            })?;
        let access = if visible {
            Access::Visible
        } else {
            Access::Hidden
        };
        record.access.insert(principal, access);
        Ok(())
    }
}

#[async_trait]
impl Messenger for MemoryGuild {
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageId, ProviderError> {
        let mut state = self.state.lock().await;
        let id = MessageId(state.next_id());
        state.messages.push(PostedMessage {
            id,
            channel,
            content: content.to_string(),
            embed: None,
            reactions: Vec::new(),
            deleted: false,
        });
        Ok(id)
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<MessageId, ProviderError> {
        let mut state = self.state.lock().await;
        let id = MessageId(state.next_id());
        state.messages.push(PostedMessage {
            id,
            channel,
            content: String::new(),
            embed: Some(embed.clone()),
            reactions: Vec::new(),
            deleted: false,
        });
        Ok(id)
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        let posted = state
            .messages
            .iter_mut()
            .find(|m| m.id == message && m.channel == channel && !m.deleted)
            .ok_or_else(|| ProviderError::NotFound {
                what: format!("message {message}"),
            })?;
        posted.reactions.push(emoji.to_string());
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        let posted = state
            .messages
            .iter_mut()
            .find(|m| m.id == message && m.channel == channel && !m.deleted)
            .ok_or_else(|| ProviderError::NotFound {
                what: format!("message {message}"),
            })?;
        posted.deleted = true;
        Ok(())
    }

    async fn trigger_typing(&self, _channel: ChannelId) -> Result<(), ProviderError> {
        self.state.lock().await.typing += 1;
        Ok(())
    }
}
