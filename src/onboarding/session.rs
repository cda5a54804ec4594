//! Onboarding session driver.
//!
//! Runs one member's [`SessionState`] to a terminal step: executes the
//! effects each transition asks for, feeds I/O results back in, and
//! suspends on the event bus between steps. Sessions run as independent
//! tasks; none of them blocks another while waiting.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audit::{AuditHandle, Auditor};
use crate::config::OnboardingConfig;
use crate::error::ProviderError;
use crate::events::{EventBus, WaitOutcome};
use crate::identity;
use crate::names;
use crate::notifier::Notifier;
use crate::platform::{Access, ChannelId, Member, Messenger, Overwrite, Principal, WorkspaceProvider};

use super::machine::{Effect, Input, SessionState};
use super::prompts;
use super::registry::{SessionRegistry, WatchEntry};
use super::state::OnboardingStep;

/// Shared collaborators of every session.
#[derive(Clone)]
pub struct OnboardingDeps {
    pub provider: Arc<dyn WorkspaceProvider>,
    pub messenger: Arc<dyn Messenger>,
    pub notifier: Arc<dyn Notifier>,
    pub auditor: Arc<dyn Auditor>,
    pub events: Arc<EventBus>,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<OnboardingConfig>,
}

/// One member's onboarding, from pending role to promotion.
pub struct OnboardingSession {
    id: Uuid,
    state: SessionState,
    deps: OnboardingDeps,
    cancel: CancellationToken,
    /// Outstanding "step pending" audit record.
    pending: Option<AuditHandle>,
}

impl OnboardingSession {
    pub fn new(id: Uuid, member: Member, deps: OnboardingDeps, cancel: CancellationToken) -> Self {
        let state = SessionState::new(member, deps.config.clone());
        Self {
            id,
            state,
            deps,
            cancel,
            pending: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the session to `Completed` or `Abandoned` and release it.
    pub async fn run(mut self) -> OnboardingStep {
        let member = self.state.member.clone();
        tracing::info!(member = %member.id, session_id = %self.id, "Onboarding started");

        self.drive().await;

        let step = self.state.step;
        self.deps.registry.release(self.id, member.id).await;
        match step {
            OnboardingStep::Completed => {
                tracing::info!(member = %member.id, session_id = %self.id, "Onboarding completed")
            }
            _ => tracing::warn!(
                member = %member.id,
                session_id = %self.id,
                step = %step,
                "Onboarding ended without completing"
            ),
        }
        step
    }

    async fn drive(&mut self) {
        // One subscription for the whole session: it exists before any prompt
        // goes out and keeps replies queued behind the one that matched.
        let mut subscription = self.deps.events.subscribe();
        let mut next = Input::Start;
        loop {
            let mut input = Some(next);
            while let Some(current) = input {
                input = self.feed(current).await;
            }

            if self.state.step.is_terminal() {
                return;
            }
            if !self.state.step.is_waiting() {
                // A transition stalled without reaching a wait; nothing can resume it.
                tracing::error!(
                    member = %self.state.member.id,
                    step = %self.state.step,
                    "Session stalled outside a waiting step"
                );
                next = Input::Failed {
                    reason: format!("stalled in step {}", self.state.step),
                };
                continue;
            }

            let state = &self.state;
            let outcome = subscription
                .wait_for(
                    |event| state.accepts(event),
                    &self.cancel,
                    self.deps.config.step_timeout,
                )
                .await;
            next = match outcome {
                WaitOutcome::Matched(event) => Input::Event(event),
                WaitOutcome::TimedOut => Input::TimedOut,
                WaitOutcome::Cancelled | WaitOutcome::Closed => Input::Cancelled,
            };
        }
    }

    /// Apply one input and run its effects. Returns the follow-up input, if any.
    async fn feed(&mut self, input: Input) -> Option<Input> {
        let effects = match self.state.apply(input) {
            Ok(effects) => effects,
            Err(e) => {
                tracing::warn!(member = %self.state.member.id, error = %e, "Input rejected");
                return None;
            }
        };
        self.deps
            .registry
            .set_step(self.id, self.state.member.id, self.state.step)
            .await;

        let mut follow_up = None;
        for effect in effects {
            if let Some(input) = self.perform(effect).await {
                let failed = matches!(input, Input::Failed { .. });
                follow_up = Some(input);
                if failed {
                    break;
                }
            }
        }
        follow_up
    }

    async fn perform(&mut self, effect: Effect) -> Option<Input> {
        let member = self.state.member.clone();
        let layout = self.deps.config.layout;

        match effect {
            Effect::Say(text) => {
                self.say(&text).await;
                None
            }

            Effect::Pause(beats) => {
                if let Some(workspace) = self.state.workspace
                    && let Err(e) = self.deps.messenger.trigger_typing(workspace).await
                {
                    tracing::debug!(error = %e, "Typing indicator failed");
                }
                tokio::time::sleep(self.deps.config.pacing * beats).await;
                None
            }

            Effect::Audit(entry) => {
                self.deps.auditor.record(entry).await;
                None
            }

            Effect::AuditPending(entry) => {
                if let Some(stale) = self.pending.take() {
                    self.deps.auditor.retract(stale).await;
                }
                self.pending = self.deps.auditor.record(entry).await;
                None
            }

            Effect::ResolvePending => {
                if let Some(handle) = self.pending.take() {
                    self.deps.auditor.retract(handle).await;
                }
                None
            }

            Effect::AssignPendingRole => Some(
                match self.deps.provider.assign_role(member.id, layout.pending_role).await {
                    Ok(()) => Input::RoleAssigned,
                    Err(e) => self.failed("assign the pending role", e),
                },
            ),

            Effect::Provision => Some(match self.provision(&member).await {
                Ok(input) => input,
                Err(e) => self.failed("provision the onboarding workspace", e),
            }),

            Effect::PostWelcome { text } => Some(match self.post_welcome(&text).await {
                Ok(input) => input,
                Err(e) => self.failed("post the welcome message", e),
            }),

            Effect::Watch => {
                if let (Some(anchor), Some(workspace)) = (self.state.anchor, self.state.workspace) {
                    self.deps
                        .registry
                        .add(
                            anchor,
                            WatchEntry {
                                session_id: self.id,
                                member,
                                workspace,
                            },
                        )
                        .await;
                }
                None
            }

            Effect::Unwatch => {
                if let Some(anchor) = self.state.anchor
                    && self.deps.registry.remove(anchor).await.is_none()
                {
                    tracing::debug!(member = %member.id, "Anchor already unwatched by escalation");
                }
                None
            }

            Effect::IssueCode { email } => {
                let code = identity::generate_verification_code();
                let delivery_error = match self
                    .deps
                    .notifier
                    .send_verification_code(&email, &code.to_string())
                    .await
                {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!(member = %member.id, to = %email, error = %e, "Verification code not delivered");
                        Some(e.to_string())
                    }
                };
                Some(Input::CodeIssued {
                    code,
                    delivery_error,
                })
            }

            Effect::PostCleanup { text } => Some(match self.post_cleanup(&text).await {
                Ok(input) => input,
                Err(e) => self.failed("post the cleanup prompt", e),
            }),

            Effect::Teardown => {
                self.teardown().await;
                None
            }

            Effect::GrantMemberRole => {
                if let Err(e) = self.deps.provider.assign_role(member.id, layout.member_role).await {
                    tracing::error!(member = %member.id, error = %e, "Failed to grant member role");
                    self.deps
                        .auditor
                        .record(prompts::audit_failed(
                            &member,
                            &format!("could not grant the member role: {e}"),
                        ))
                        .await;
                }
                None
            }
        }
    }

    async fn say(&self, text: &str) {
        let Some(workspace) = self.state.workspace else {
            tracing::warn!(member = %self.state.member.id, "No workspace to post into");
            return;
        };
        if let Err(e) = self.deps.messenger.send_message(workspace, text).await {
            tracing::warn!(member = %self.state.member.id, error = %e, "Failed to post message");
        }
    }

    /// Create the temporary role and private workspace.
    async fn provision(&self, member: &Member) -> Result<Input, ProviderError> {
        let layout = self.deps.config.layout;
        let name = names::random_name();
        let provider = &self.deps.provider;

        let role = provider.create_role(&names::temp_role_name(&name)).await?;
        let overwrites = [
            Overwrite::new(Principal::Everyone, Access::Hidden),
            Overwrite::new(Principal::Role(layout.pending_role), Access::Hidden),
            Overwrite::new(Principal::Role(role), Access::ReadWrite),
            Overwrite::new(Principal::Role(layout.staff_role), Access::ReadWrite),
        ];
        let created = match provider.assign_role(member.id, role).await {
            Ok(()) => {
                provider
                    .create_workspace(&name, layout.verification_area, &overwrites)
                    .await
            }
            Err(e) => Err(e),
        };

        match created {
            Ok(workspace) => {
                tracing::info!(member = %member.id, workspace = %workspace, name = %name, "Workspace provisioned");
                Ok(Input::Provisioned {
                    role,
                    workspace,
                    name,
                })
            }
            Err(e) => {
                if let Err(cleanup) = provider.delete_role(role).await {
                    tracing::warn!(role = %role, error = %cleanup, "Failed to remove orphaned role");
                }
                Err(e)
            }
        }
    }

    async fn post_welcome(&self, text: &str) -> Result<Input, ProviderError> {
        let workspace = self.workspace()?;
        let anchor = self.deps.messenger.send_message(workspace, text).await?;
        for emoji in [prompts::BEGIN_EMOJI, prompts::HELP_EMOJI] {
            self.deps.messenger.add_reaction(workspace, anchor, emoji).await?;
        }
        Ok(Input::WelcomePosted { anchor })
    }

    async fn post_cleanup(&self, text: &str) -> Result<Input, ProviderError> {
        let workspace = self.workspace()?;
        let message = self.deps.messenger.send_message(workspace, text).await?;
        self.deps
            .messenger
            .add_reaction(workspace, message, prompts::CLEANUP_EMOJI)
            .await?;
        Ok(Input::CleanupPosted { message })
    }

    async fn teardown(&self) {
        let member = &self.state.member;
        if let Some(role) = self.state.role
            && let Err(e) = self.deps.provider.delete_role(role).await
        {
            tracing::warn!(member = %member.id, role = %role, error = %e, "Failed to delete onboarding role");
        }
        if let Some(workspace) = self.state.workspace
            && let Err(e) = self.deps.provider.delete_workspace(workspace).await
        {
            tracing::warn!(member = %member.id, workspace = %workspace, error = %e, "Failed to delete onboarding workspace");
        }
    }

    fn workspace(&self) -> Result<ChannelId, ProviderError> {
        self.state.workspace.ok_or_else(|| ProviderError::NotFound {
            what: format!("onboarding workspace for {}", self.state.member.id),
        })
    }

    fn failed(&self, action: &str, error: ProviderError) -> Input {
        tracing::error!(member = %self.state.member.id, error = %error, "Failed to {action}");
        Input::Failed {
            reason: format!("failed to {action}: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::audit::LogChannelAuditor;
    use crate::config::GuildLayout;
    use crate::error::NotifierError;
    use crate::events::Event;
    use crate::platform::memory::MemoryGuild;
    use crate::platform::{MessageId, UserId};

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), NotifierError> {
            self.sent.lock().await.push((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    struct Harness {
        guild: Arc<MemoryGuild>,
        deps: OnboardingDeps,
        outbox: Arc<Outbox>,
    }

    async fn harness(timeout: Option<Duration>) -> Harness {
        let guild = Arc::new(MemoryGuild::new());
        let layout = GuildLayout {
            pending_role: guild.add_role("pending").await,
            member_role: guild.add_role("member").await,
            support_role: guild.add_role("support").await,
            staff_role: guild.add_role("staff").await,
            log_channel: ChannelId(1),
            verification_area: guild.add_area().await,
        };
        let mut config = OnboardingConfig::new(layout, UserId(1), "berkeley.edu");
        config.pacing = Duration::ZERO;
        config.step_timeout = timeout;

        let outbox = Arc::new(Outbox::default());
        let deps = OnboardingDeps {
            provider: guild.clone(),
            messenger: guild.clone(),
            notifier: outbox.clone(),
            auditor: Arc::new(LogChannelAuditor::new(guild.clone(), layout.log_channel)),
            events: Arc::new(EventBus::default()),
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
        };
        Harness { guild, deps, outbox }
    }

    async fn welcome_anchor(h: &Harness) -> (ChannelId, MessageId) {
        for _ in 0..200 {
            for ws in h
                .guild
                .list_workspaces(h.deps.config.layout.verification_area)
                .await
                .unwrap()
            {
                if let Some(msg) = h.guild.messages_in(ws.id).await.first() {
                    return (ws.id, msg.id);
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("welcome message never posted");
    }

    #[tokio::test]
    async fn timeout_abandons_and_tears_down() {
        let h = harness(Some(Duration::from_millis(50))).await;
        let oski = Member::new(UserId(7), "oski");
        h.guild.add_member(oski.clone()).await;

        let cancel = CancellationToken::new();
        let id = h.deps.registry.claim(&oski, cancel.clone()).await.unwrap();
        let session = OnboardingSession::new(id, oski.clone(), h.deps.clone(), cancel);
        let step = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .unwrap();

        assert_eq!(step, OnboardingStep::Abandoned);
        assert!(h
            .guild
            .list_workspaces(h.deps.config.layout.verification_area)
            .await
            .unwrap()
            .is_empty());
        assert!(h.guild.roles().await.iter().all(|r| !names::is_temp_role(&r.name)));
        assert_eq!(h.deps.registry.watched_count().await, 0);
        assert!(!h.deps.registry.is_active(oski.id).await);
    }

    #[tokio::test]
    async fn cancel_abandons_without_teardown() {
        let h = harness(None).await;
        let oski = Member::new(UserId(7), "oski");
        h.guild.add_member(oski.clone()).await;

        let cancel = CancellationToken::new();
        let id = h.deps.registry.claim(&oski, cancel.clone()).await.unwrap();
        let task = tokio::spawn(OnboardingSession::new(id, oski.clone(), h.deps.clone(), cancel.clone()).run());

        let (workspace, _) = welcome_anchor(&h).await;
        cancel.cancel();
        let step = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(step, OnboardingStep::Abandoned);
        assert!(h.guild.has_workspace(workspace).await);
        assert_eq!(h.deps.registry.watched_count().await, 0);
    }

    #[tokio::test]
    async fn provisioning_failure_ends_session_and_audits() {
        let h = harness(None).await;
        let oski = Member::new(UserId(7), "oski");
        h.guild.add_member(oski.clone()).await;
        h.guild.fail_workspace_creation(true).await;

        let cancel = CancellationToken::new();
        let id = h.deps.registry.claim(&oski, cancel.clone()).await.unwrap();
        let step = tokio::time::timeout(
            Duration::from_secs(5),
            OnboardingSession::new(id, oski.clone(), h.deps.clone(), cancel).run(),
        )
        .await
        .unwrap();

        assert_eq!(step, OnboardingStep::Abandoned);
        assert!(h.guild.roles().await.iter().all(|r| !names::is_temp_role(&r.name)));
        let log = h.guild.messages_in(ChannelId(1)).await;
        assert!(log.iter().any(|m| m
            .embed
            .as_ref()
            .is_some_and(|e| e.title.starts_with("❌ Onboarding oski failed"))));
    }

    #[tokio::test]
    async fn back_to_back_replies_are_both_consumed() {
        let h = harness(Some(Duration::from_secs(5))).await;
        let oski = Member::new(UserId(7), "oski");
        h.guild.add_member(oski.clone()).await;

        let cancel = CancellationToken::new();
        let id = h.deps.registry.claim(&oski, cancel.clone()).await.unwrap();
        let task = tokio::spawn(OnboardingSession::new(id, oski.clone(), h.deps.clone(), cancel.clone()).run());

        let (workspace, anchor) = welcome_anchor(&h).await;
        let bus = h.deps.events.clone();
        bus.publish(Event::reaction(oski.clone(), workspace, anchor, prompts::BEGIN_EMOJI));
        for _ in 0..200 {
            if h.guild.messages_in(workspace).await.iter().any(|m| m.content.contains("`agree`")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // The email arrives while the acknowledgement is still being processed.
        bus.publish(Event::message(oski.clone(), workspace, "agree"));
        bus.publish(Event::message(oski.clone(), workspace, "student@berkeley.edu"));

        let mut reached = false;
        for _ in 0..400 {
            let sessions = h.deps.registry.sessions().await;
            if sessions.first().map(|s| s.step) == Some(OnboardingStep::AwaitingCodeEntry) {
                reached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(reached, "second reply was not consumed");
        let sent = h.outbox.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "student@berkeley.edu");

        cancel.cancel();
        assert_eq!(task.await.unwrap(), OnboardingStep::Abandoned);
    }

    #[tokio::test]
    async fn code_is_delivered_to_collected_email() {
        let h = harness(None).await;
        let oski = Member::new(UserId(7), "oski");
        h.guild.add_member(oski.clone()).await;

        let cancel = CancellationToken::new();
        let id = h.deps.registry.claim(&oski, cancel.clone()).await.unwrap();
        let task = tokio::spawn(OnboardingSession::new(id, oski.clone(), h.deps.clone(), cancel.clone()).run());

        let (workspace, anchor) = welcome_anchor(&h).await;
        let bus = h.deps.events.clone();
        bus.publish(Event::reaction(oski.clone(), workspace, anchor, prompts::BEGIN_EMOJI));

        // Wait for the conduct prompt before replying.
        for _ in 0..200 {
            if h.guild.messages_in(workspace).await.iter().any(|m| m.content.contains("`agree`")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bus.publish(Event::message(oski.clone(), workspace, "agree"));

        for _ in 0..200 {
            if h.guild.messages_in(workspace).await.iter().any(|m| m.content.contains("email address")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bus.publish(Event::message(oski.clone(), workspace, "student@berkeley.edu"));

        for _ in 0..200 {
            if !h.outbox.sent.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let sent = h.outbox.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "student@berkeley.edu");
        let code: u32 = sent[0].1.parse().unwrap();
        assert!((identity::CODE_MIN..=identity::CODE_MAX).contains(&code));

        cancel.cancel();
        task.await.unwrap();
    }
}
