//! OnboardingManager owns the registry, starts sessions, runs the
//! escalation handler and dispatches gateway events.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::commands;
use crate::error::{OnboardingError, ProviderError};
use crate::events::{Event, EventBus};
use crate::platform::Member;

use super::escalation::EscalationHandler;
use super::prompts;
use super::registry::{SessionRegistry, SessionSummary};
use super::reset::{self, ResetReport};
use super::session::{OnboardingDeps, OnboardingSession};
use super::state::OnboardingStep;

/// A running session.
#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub member: Member,
    cancel: CancellationToken,
    task: JoinHandle<OnboardingStep>,
}

impl SessionHandle {
    /// Ask the session to stop at its next wait.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to finish and return its final step.
    pub async fn join(self) -> OnboardingStep {
        match self.task.await {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "Session task failed");
                OnboardingStep::Abandoned
            }
        }
    }
}

/// Coordinates every onboarding session of the community.
pub struct OnboardingManager {
    deps: OnboardingDeps,
    escalation: EscalationHandler,
    shutdown: CancellationToken,
}

impl OnboardingManager {
    pub fn new(deps: OnboardingDeps) -> Self {
        let escalation = EscalationHandler::new(
            deps.provider.clone(),
            deps.messenger.clone(),
            deps.auditor.clone(),
            deps.registry.clone(),
            deps.config.layout,
            deps.config.bot_user,
        );
        Self {
            deps,
            escalation,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn deps(&self) -> &OnboardingDeps {
        &self.deps
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.deps.events
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.deps.registry
    }

    /// Greet a new member in the audit trail and start their session.
    pub async fn on_member_joined(&self, member: Member) -> Result<SessionHandle, OnboardingError> {
        self.deps.auditor.record(prompts::audit_joined(&member)).await;
        self.start(member).await
    }

    /// Start a session for `member`; fails if one is already running.
    pub async fn start(&self, member: Member) -> Result<SessionHandle, OnboardingError> {
        let cancel = self.shutdown.child_token();
        let session_id = self.deps.registry.claim(&member, cancel.clone()).await?;
        let session = OnboardingSession::new(session_id, member.clone(), self.deps.clone(), cancel.clone());
        let task = tokio::spawn(session.run());
        Ok(SessionHandle {
            session_id,
            member,
            cancel,
            task,
        })
    }

    /// Sweep all onboarding resources, then cancel every live session.
    pub async fn reset(&self) -> Result<ResetReport, ProviderError> {
        let report = reset::reset_server(
            self.deps.provider.as_ref(),
            self.deps.auditor.as_ref(),
            self.deps.config.layout.verification_area,
        )
        .await?;
        let cancelled = self.deps.registry.cancel_all().await;
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled live sessions after reset");
        }
        Ok(report)
    }

    pub async fn sessions(&self) -> Vec<SessionSummary> {
        self.deps.registry.sessions().await
    }

    /// Stop the dispatch loop and every session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Dispatch gateway events until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut subscription = self.deps.events.subscribe();

        let escalation = tokio::spawn({
            let this = self.clone();
            async move {
                this.escalation
                    .run(&this.deps.events, this.shutdown.child_token())
                    .await
            }
        });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Onboarding dispatch stopped");
                    break;
                }
                event = subscription.next() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
            }
        }

        if let Err(e) = escalation.await {
            tracing::warn!(error = %e, "Escalation task ended abnormally");
        }
    }

    async fn dispatch(self: &Arc<Self>, event: Event) {
        if let Event::MemberJoined { member } = event {
            let this = self.clone();
            tokio::spawn(async move {
                let id = member.id;
                if let Err(e) = this.on_member_joined(member).await {
                    tracing::warn!(member = %id, error = %e, "Could not start onboarding");
                }
            });
            return;
        }
        if commands::is_command_event(&event) {
            let this = self.clone();
            tokio::spawn(async move { commands::dispatch(&this, &event).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::audit::{AuditEntry, AuditHandle, Auditor, LogChannelAuditor};
    use crate::config::{GuildLayout, OnboardingConfig};
    use crate::error::NotifierError;
    use crate::notifier::Notifier;
    use crate::platform::memory::MemoryGuild;
    use crate::platform::{ChannelId, UserId};

    struct Discard;

    #[async_trait]
    impl Notifier for Discard {
        async fn send_verification_code(&self, _: &str, _: &str) -> Result<(), NotifierError> {
            Ok(())
        }
    }

    async fn manager() -> (Arc<MemoryGuild>, OnboardingManager) {
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
        let deps = OnboardingDeps {
            provider: guild.clone(),
            messenger: guild.clone(),
            notifier: Arc::new(Discard),
            auditor: Arc::new(LogChannelAuditor::new(guild.clone(), layout.log_channel)),
            events: Arc::new(EventBus::default()),
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
        };
        (guild, OnboardingManager::new(deps))
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let (guild, manager) = manager().await;
        let oski = Member::new(UserId(7), "oski");
        guild.add_member(oski.clone()).await;

        let handle = manager.start(oski.clone()).await.unwrap();
        let err = manager.start(oski.clone()).await.unwrap_err();
        assert!(matches!(err, OnboardingError::AlreadyActive { .. }));

        handle.cancel();
        let step = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();
        assert_eq!(step, OnboardingStep::Abandoned);
        assert!(manager.start(oski).await.is_ok());
        manager.shutdown();
    }

    #[tokio::test]
    async fn join_is_audited_before_onboarding() {
        let (guild, manager) = manager().await;
        let oski = Member::new(UserId(7), "oski");
        guild.add_member(oski.clone()).await;

        let handle = manager.on_member_joined(oski).await.unwrap();
        let log = guild.messages_in(ChannelId(1)).await;
        assert_eq!(
            log[0].embed.as_ref().map(|e| e.title.as_str()),
            Some("👋 New member joined!")
        );
        handle.cancel();
        handle.join().await;
    }

    #[tokio::test]
    async fn reset_cancels_live_sessions() {
        let (guild, manager) = manager().await;
        let oski = Member::new(UserId(7), "oski");
        guild.add_member(oski.clone()).await;
        let handle = manager.start(oski.clone()).await.unwrap();

        for _ in 0..200 {
            if manager.registry().watched_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = manager.reset().await.unwrap();
        assert_eq!(report.removed_workspaces.len(), 1);
        assert_eq!(report.removed_roles.len(), 1);

        let step = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();
        assert_eq!(step, OnboardingStep::Abandoned);
        assert!(manager.sessions().await.is_empty());
    }

    /// Audit sink that never returns for records mentioning one member.
    struct StallOn {
        name: &'static str,
        inner: LogChannelAuditor,
    }

    #[async_trait]
    impl Auditor for StallOn {
        async fn record(&self, entry: AuditEntry) -> Option<AuditHandle> {
            if entry.message.contains(self.name) {
                std::future::pending::<()>().await;
            }
            self.inner.record(entry).await
        }

        async fn retract(&self, handle: AuditHandle) {
            self.inner.retract(handle).await
        }
    }

    #[tokio::test]
    async fn slow_join_audit_does_not_hold_up_other_joins() {
        let (guild, base) = manager().await;
        let mut deps = base.deps().clone();
        deps.auditor = Arc::new(StallOn {
            name: "slowpoke",
            inner: LogChannelAuditor::new(guild.clone(), ChannelId(1)),
        });
        let manager = Arc::new(OnboardingManager::new(deps));
        let slow = Member::new(UserId(8), "slowpoke");
        let oski = Member::new(UserId(7), "oski");
        guild.add_member(slow.clone()).await;
        guild.add_member(oski.clone()).await;

        tokio::spawn(manager.clone().run());
        for _ in 0..200 {
            if manager.events().subscriber_count() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        manager.events().publish(Event::MemberJoined { member: slow });
        manager.events().publish(Event::MemberJoined { member: oski });

        let mut started = false;
        for _ in 0..200 {
            if manager.registry().is_active(UserId(7)).await {
                started = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(started);
        assert!(!manager.registry().is_active(UserId(8)).await);
        manager.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_dispatch() {
        let (_guild, manager) = manager().await;
        let manager = Arc::new(manager);
        let run = tokio::spawn(manager.clone().run());
        manager.shutdown();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
    }
}
