//! Pure onboarding transitions.
//!
//! [`SessionState::apply`] maps `(state, input)` to a new state plus a list
//! of [`Effect`]s. It performs no I/O: the session driver executes the
//! effects and feeds their results (posted message ids, issued codes,
//! provisioned resources) back in as further [`Input`]s.

use std::sync::Arc;

use crate::audit::AuditEntry;
use crate::config::OnboardingConfig;
use crate::error::OnboardingError;
use crate::events::Event;
use crate::identity::{self, EmailRejection};
use crate::platform::{ChannelId, Member, MessageId, RoleId};

use super::prompts;
use super::state::OnboardingStep;

/// Something that happened to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The join handler or an administrator started the session.
    Start,
    /// The pending role is now held by the member.
    RoleAssigned,
    Provisioned {
        role: RoleId,
        workspace: ChannelId,
        name: String,
    },
    WelcomePosted {
        anchor: MessageId,
    },
    /// A code was generated and handed to the notifier.
    CodeIssued {
        code: u32,
        delivery_error: Option<String>,
    },
    CleanupPosted {
        message: MessageId,
    },
    /// A gateway event the session was waiting for.
    Event(Event),
    /// A provider call the session depends on failed.
    Failed {
        reason: String,
    },
    TimedOut,
    Cancelled,
}

impl Input {
    fn label(&self) -> String {
        match self {
            Self::Start => "start".into(),
            Self::RoleAssigned => "role_assigned".into(),
            Self::Provisioned { name, .. } => format!("provisioned({name})"),
            Self::WelcomePosted { anchor } => format!("welcome_posted({anchor})"),
            Self::CodeIssued { .. } => "code_issued".into(),
            Self::CleanupPosted { message } => format!("cleanup_posted({message})"),
            Self::Event(event) => format!("event({:?} by {})", event.kind(), event.actor()),
            Self::Failed { .. } => "failed".into(),
            Self::TimedOut => "timed_out".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }
}

/// Side effect requested by a transition, executed in order by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Post text in the workspace.
    Say(String),
    /// Typing indicator for this many pacing beats.
    Pause(u32),
    Audit(AuditEntry),
    /// Audit record retracted by the next [`Effect::ResolvePending`].
    AuditPending(AuditEntry),
    ResolvePending,
    AssignPendingRole,
    /// Create the temporary role and workspace; answer with `Provisioned`.
    Provision,
    /// Post the anchor with begin/help reactions; answer with `WelcomePosted`.
    PostWelcome { text: String },
    /// Register the anchor for help escalation.
    Watch,
    Unwatch,
    /// Generate and deliver a code; answer with `CodeIssued`.
    IssueCode { email: String },
    /// Post the cleanup prompt with its reaction; answer with `CleanupPosted`.
    PostCleanup { text: String },
    /// Delete the temporary role and workspace.
    Teardown,
    GrantMemberRole,
}

/// Everything one session knows about itself.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub member: Member,
    pub step: OnboardingStep,
    pub role: Option<RoleId>,
    pub workspace: Option<ChannelId>,
    pub workspace_name: Option<String>,
    /// The welcome message; keys the session for escalation.
    pub anchor: Option<MessageId>,
    pub cleanup_message: Option<MessageId>,
    pub sos_watched: bool,
    pub pending_email: Option<String>,
    pub verification_code: Option<u32>,
    config: Arc<OnboardingConfig>,
}

impl SessionState {
    pub fn new(member: Member, config: Arc<OnboardingConfig>) -> Self {
        Self {
            member,
            step: OnboardingStep::default(),
            role: None,
            workspace: None,
            workspace_name: None,
            anchor: None,
            cleanup_message: None,
            sos_watched: false,
            pending_email: None,
            verification_code: None,
            config,
        }
    }

    pub fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    /// Whether `event` resolves the current wait.
    pub fn accepts(&self, event: &Event) -> bool {
        match self.step {
            OnboardingStep::AwaitingWelcomeAck => {
                self.is_member_reaction(event, self.anchor, prompts::BEGIN_EMOJI)
            }
            OnboardingStep::AwaitingCleanupAck => {
                self.is_member_reaction(event, self.cleanup_message, prompts::CLEANUP_EMOJI)
            }
            OnboardingStep::AwaitingConductAck => self.reply_text(event).is_some_and(|text| {
                text.to_lowercase()
                    .contains(&self.config.ack_keyword.to_lowercase())
            }),
            OnboardingStep::AwaitingEmail | OnboardingStep::AwaitingCodeEntry => {
                self.reply_text(event).is_some()
            }
            _ => false,
        }
    }

    fn is_member_reaction(&self, event: &Event, target: Option<MessageId>, want: &str) -> bool {
        match event {
            Event::ReactionAdded {
                user,
                message,
                emoji,
                from_bot,
                ..
            } => {
                !from_bot
                    && user.id != self.config.bot_user
                    && user.id == self.member.id
                    && Some(*message) == target
                    && emoji == want
            }
            _ => false,
        }
    }

    /// Text of a reply that counts for this session's workspace.
    fn reply_text<'e>(&self, event: &'e Event) -> Option<&'e str> {
        match event {
            Event::MessageReceived {
                author,
                channel,
                content,
                from_bot,
                ..
            } if !from_bot
                && author.id != self.config.bot_user
                && Some(*channel) == self.workspace
                && (!self.config.member_replies_only || author.id == self.member.id) =>
            {
                Some(content.as_str())
            }
            _ => None,
        }
    }

    /// Apply one input, returning the effects to perform.
    pub fn apply(&mut self, input: Input) -> Result<Vec<Effect>, OnboardingError> {
        use OnboardingStep as S;

        match (self.step, input) {
            (S::Created, Input::Start) => Ok(vec![Effect::AssignPendingRole]),

            (S::Created, Input::RoleAssigned) => {
                self.advance(S::RoleAssigned)?;
                Ok(vec![
                    Effect::Audit(prompts::audit_role_assigned(&self.member)),
                    Effect::Provision,
                ])
            }

            (
                S::RoleAssigned,
                Input::Provisioned {
                    role,
                    workspace,
                    name,
                },
            ) => {
                self.advance(S::WorkspaceProvisioned)?;
                self.role = Some(role);
                self.workspace = Some(workspace);
                let audit = prompts::audit_provisioned(&self.member, &name);
                self.workspace_name = Some(name);
                Ok(vec![
                    Effect::Audit(audit),
                    Effect::PostWelcome {
                        text: prompts::welcome(&self.config.community_name, &self.member),
                    },
                ])
            }

            (S::WorkspaceProvisioned, Input::WelcomePosted { anchor }) => {
                self.advance(S::AwaitingWelcomeAck)?;
                self.anchor = Some(anchor);
                self.sos_watched = true;
                Ok(vec![
                    Effect::Watch,
                    Effect::AuditPending(prompts::audit_welcome_pending(&self.member)),
                ])
            }

            (step, Input::Event(event)) if step.is_waiting() => {
                if !self.accepts(&event) {
                    return Err(self.unexpected(&Input::Event(event)));
                }
                self.on_event(event)
            }

            (S::AwaitingEmail, Input::CodeIssued {
                code,
                delivery_error,
            }) => {
                let email = match self.pending_email.clone() {
                    Some(email) => email,
                    None => {
                        return Err(self.unexpected(&Input::CodeIssued {
                            code,
                            delivery_error,
                        }));
                    }
                };
                self.advance(S::AwaitingCodeEntry)?;
                self.verification_code = Some(code);

                let mut effects = Vec::new();
                if let Some(reason) = delivery_error {
                    effects.push(Effect::Audit(prompts::audit_code_undelivered(
                        &self.member,
                        &email,
                        &reason,
                    )));
                }
                let shown = self.config.audit_plaintext_codes.then_some(code);
                effects.extend([
                    Effect::Say(prompts::code_sent(&email)),
                    Effect::AuditPending(prompts::audit_code_pending(&self.member, &email, shown)),
                    Effect::Pause(1),
                    Effect::Say(prompts::CODE_PROMPT.to_string()),
                ]);
                Ok(effects)
            }

            (S::Verified, Input::CleanupPosted { message }) => {
                self.advance(S::AwaitingCleanupAck)?;
                self.cleanup_message = Some(message);
                Ok(Vec::new())
            }

            (step, Input::TimedOut) if !step.is_terminal() => {
                let mut effects = self.abandon()?;
                effects.push(Effect::Audit(prompts::audit_abandoned(
                    &self.member,
                    self.config.step_timeout,
                )));
                if step.holds_workspace() {
                    effects.push(Effect::Teardown);
                }
                Ok(effects)
            }

            (step, Input::Cancelled) if !step.is_terminal() => {
                let mut effects = self.abandon()?;
                effects.push(Effect::Audit(prompts::audit_abandoned(&self.member, None)));
                Ok(effects)
            }

            (step, Input::Failed { reason }) if !step.is_terminal() => {
                let mut effects = self.abandon()?;
                effects.push(Effect::Audit(prompts::audit_failed(&self.member, &reason)));
                if step.holds_workspace() {
                    effects.push(Effect::Teardown);
                }
                Ok(effects)
            }

            (_, input) => Err(self.unexpected(&input)),
        }
    }

    fn on_event(&mut self, event: Event) -> Result<Vec<Effect>, OnboardingError> {
        use OnboardingStep as S;

        let text = match &event {
            Event::MessageReceived { content, .. } => content.clone(),
            _ => String::new(),
        };

        match self.step {
            S::AwaitingWelcomeAck => {
                self.advance(S::AwaitingConductAck)?;
                Ok(vec![
                    Effect::Say(prompts::WAVE_BACK.to_string()),
                    Effect::ResolvePending,
                    Effect::Audit(prompts::audit_welcome_done(&self.member)),
                    Effect::Pause(2),
                    Effect::Say(prompts::INTRO.to_string()),
                    Effect::Pause(1),
                    Effect::Say(prompts::CONDUCT_NOTICE.to_string()),
                    Effect::Pause(1),
                    Effect::Say(self.config.conduct_url.clone()),
                    Effect::Pause(2),
                    Effect::Say(prompts::ack_prompt(&self.config.ack_keyword)),
                    Effect::AuditPending(prompts::audit_conduct_pending(&self.member)),
                ])
            }

            S::AwaitingConductAck => {
                self.advance(S::AwaitingEmail)?;
                Ok(vec![
                    Effect::Say(prompts::conduct_thanks(&self.member)),
                    Effect::ResolvePending,
                    Effect::Audit(prompts::audit_conduct_done(&self.member)),
                    Effect::Pause(2),
                    Effect::Say(prompts::EMAIL_INTRO.to_string()),
                    Effect::AuditPending(prompts::audit_email_pending(&self.member)),
                    Effect::Pause(1),
                    Effect::Say(prompts::email_prompt(&self.config.allowed_domain)),
                ])
            }

            S::AwaitingEmail => {
                let email = text.trim();
                let rejection = match identity::check_email(email, &self.config.allowed_domain) {
                    Ok(()) => {
                        self.pending_email = Some(email.to_string());
                        return Ok(vec![
                            Effect::ResolvePending,
                            Effect::Audit(prompts::audit_email_done(&self.member, email)),
                            Effect::IssueCode {
                                email: email.to_string(),
                            },
                        ]);
                    }
                    Err(EmailRejection::InvalidSyntax) => prompts::INVALID_EMAIL.to_string(),
                    Err(EmailRejection::WrongDomain) => {
                        prompts::invalid_domain(&self.config.allowed_domain)
                    }
                };
                Ok(vec![
                    Effect::Say(rejection),
                    Effect::Pause(1),
                    Effect::Say(prompts::email_prompt(&self.config.allowed_domain)),
                ])
            }

            S::AwaitingCodeEntry => {
                let expected = match self.verification_code {
                    Some(code) => code,
                    None => return Err(self.unexpected(&Input::Event(event))),
                };
                if !identity::codes_match(&text, expected) {
                    return Ok(vec![
                        Effect::Say(prompts::INCORRECT_CODE.to_string()),
                        Effect::Pause(1),
                        Effect::Say(prompts::CODE_PROMPT.to_string()),
                    ]);
                }

                self.advance(S::Verified)?;
                self.verification_code = None;
                self.sos_watched = false;
                let email = self.pending_email.clone().unwrap_or_default();
                Ok(vec![
                    Effect::ResolvePending,
                    Effect::Audit(prompts::audit_verified(&self.member, &email)),
                    Effect::Unwatch,
                    Effect::Audit(prompts::audit_unwatched(&self.member)),
                    Effect::Say(prompts::VERIFIED.to_string()),
                    Effect::PostCleanup {
                        text: prompts::CLEANUP_PROMPT.to_string(),
                    },
                ])
            }

            S::AwaitingCleanupAck => {
                self.advance(S::Completed)?;
                Ok(vec![
                    Effect::Teardown,
                    Effect::Audit(prompts::audit_cleaned_up(&self.member)),
                    Effect::GrantMemberRole,
                ])
            }

            _ => Err(self.unexpected(&Input::Event(event))),
        }
    }

    /// Move to `Abandoned`, releasing the pending record and the watch.
    fn abandon(&mut self) -> Result<Vec<Effect>, OnboardingError> {
        self.advance(OnboardingStep::Abandoned)?;
        self.verification_code = None;
        let mut effects = vec![Effect::ResolvePending];
        if self.sos_watched {
            self.sos_watched = false;
            effects.push(Effect::Unwatch);
        }
        Ok(effects)
    }

    fn advance(&mut self, to: OnboardingStep) -> Result<(), OnboardingError> {
        if !self.step.can_transition_to(to) {
            return Err(OnboardingError::InvalidTransition {
                from: self.step,
                to,
            });
        }
        tracing::debug!(member = %self.member.id, from = %self.step, to = %to, "Onboarding step");
        self.step = to;
        Ok(())
    }

    fn unexpected(&self, input: &Input) -> OnboardingError {
        OnboardingError::UnexpectedInput {
            step: self.step,
            input: input.label(),
        }
    }
}
