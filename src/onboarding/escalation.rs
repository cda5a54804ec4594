//! Help escalation.
//!
//! A 🆘 reaction on a watched welcome message pages the support role inside
//! that workspace, records an error-severity audit entry and lets support
//! see the workspace. The session itself keeps waiting on its current step.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::audit::Auditor;
use crate::config::GuildLayout;
use crate::events::{Event, EventBus};
use crate::platform::{Member, Messenger, Principal, UserId, WorkspaceProvider};

use super::prompts;
use super::registry::{SessionRegistry, WatchEntry};

/// Routes help reactions against the session registry.
pub struct EscalationHandler {
    provider: Arc<dyn WorkspaceProvider>,
    messenger: Arc<dyn Messenger>,
    auditor: Arc<dyn Auditor>,
    registry: Arc<SessionRegistry>,
    layout: GuildLayout,
    bot_user: UserId,
}

impl EscalationHandler {
    pub fn new(
        provider: Arc<dyn WorkspaceProvider>,
        messenger: Arc<dyn Messenger>,
        auditor: Arc<dyn Auditor>,
        registry: Arc<SessionRegistry>,
        layout: GuildLayout,
        bot_user: UserId,
    ) -> Self {
        Self {
            provider,
            messenger,
            auditor,
            registry,
            layout,
            bot_user,
        }
    }

    /// Listen on the bus until cancelled.
    pub async fn run(&self, events: &EventBus, cancel: CancellationToken) {
        let mut subscription = events.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Escalation handler cancelled");
                    break;
                }
                event = subscription.next() => match event {
                    Some(event) => {
                        self.handle(&event).await;
                    }
                    None => break,
                },
            }
        }
    }

    /// Escalate if `event` is a help request on a watched anchor.
    ///
    /// Returns the session that was escalated. The anchor is taken out of
    /// the registry first, so each anchor escalates at most once; every
    /// side effect after the take is attempted even if an earlier one fails.
    pub async fn handle(&self, event: &Event) -> Option<WatchEntry> {
        let requester = self.help_request(event)?;
        let Event::ReactionAdded { message, .. } = event else {
            return None;
        };
        let entry = self.registry.remove(*message).await?;

        tracing::warn!(
            member = %entry.member.id,
            requester = %requester.id,
            workspace = %entry.workspace,
            "Help requested"
        );
        if let Err(e) = self
            .messenger
            .send_message(entry.workspace, &prompts::help_requested(self.layout.support_role))
            .await
        {
            tracing::error!(workspace = %entry.workspace, error = %e, "Failed to page support");
        }
        self.auditor
            .record(prompts::audit_help_requested(requester, entry.workspace))
            .await;
        if let Err(e) = self
            .provider
            .set_workspace_visibility(
                entry.workspace,
                Principal::Role(self.layout.support_role),
                true,
            )
            .await
        {
            tracing::error!(workspace = %entry.workspace, error = %e, "Failed to grant support access");
        }
        Some(entry)
    }

    fn help_request<'e>(&self, event: &'e Event) -> Option<&'e Member> {
        match event {
            Event::ReactionAdded {
                user,
                emoji,
                from_bot,
                ..
            } if emoji == prompts::HELP_EMOJI && !from_bot && user.id != self.bot_user => {
                Some(user)
            }
            _ => None,
        }
    }
}
