//! Administrative chat commands.
//!
//! `!onboard <@member|id>`, `!reset_server` and `!email_code <email> <code>`,
//! available to holders of the staff role only. Callers without it are
//! refused silently.

use crate::error::{CommandError, OnboardingError, ProviderError};
use crate::events::Event;
use crate::identity;
use crate::onboarding::OnboardingManager;
use crate::platform::{RoleId, UserId};

/// Prefix shared by all commands.
pub const PREFIX: char = '!';

/// A parsed administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start onboarding for a member out of band.
    Onboard { target: UserId },
    /// Remove every temporary role and workspace.
    ResetServer,
    /// Send an arbitrary code to an arbitrary address, without a session.
    EmailCode { email: String, code: String },
}

/// Parses message content into commands.
pub struct CommandParser;

impl CommandParser {
    /// `Ok(None)` for anything that is not one of our commands.
    pub fn parse(content: &str) -> Result<Option<Command>, CommandError> {
        let Some(body) = content.trim().strip_prefix(PREFIX) else {
            return Ok(None);
        };
        let mut parts = body.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = parts.collect();

        match name.as_str() {
            "onboard" => match args.as_slice() {
                [target] => Ok(Some(Command::Onboard {
                    target: parse_member(target)?,
                })),
                _ => Err(CommandError::Usage("!onboard <@member|id>".into())),
            },
            "reset_server" => Ok(Some(Command::ResetServer)),
            "email_code" => match args.as_slice() {
                [email, code] => Ok(Some(Command::EmailCode {
                    email: email.to_string(),
                    code: code.to_string(),
                })),
                _ => Err(CommandError::Usage("!email_code <email> <code>".into())),
            },
            _ => Ok(None),
        }
    }
}

/// Accepts `<@123>`, `<@!123>` or a bare id.
fn parse_member(arg: &str) -> Result<UserId, CommandError> {
    let raw = arg
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.trim_start_matches('!'))
        .unwrap_or(arg);
    raw.parse()
        .map_err(|_| CommandError::UnknownMember(arg.to_string()))
}

/// Whether an event is a human message that looks like a command.
pub fn is_command_event(event: &Event) -> bool {
    matches!(
        event,
        Event::MessageReceived { content, from_bot: false, .. }
            if content.trim_start().starts_with(PREFIX)
    )
}

/// Run a command on behalf of a caller holding `caller_roles`.
///
/// Returns the reply to post back to the caller.
pub async fn execute(
    manager: &OnboardingManager,
    caller_roles: &[RoleId],
    command: Command,
) -> Result<String, CommandError> {
    let deps = manager.deps();
    if !caller_roles.contains(&deps.config.layout.staff_role) {
        return Err(CommandError::NotStaff);
    }

    match command {
        Command::Onboard { target } => {
            let member = deps.provider.member(target).await.map_err(|e| match e {
                ProviderError::NotFound { .. } => CommandError::UnknownMember(target.mention()),
                other => CommandError::Provider(other),
            })?;
            let mention = member.mention();
            manager.on_member_joined(member).await?;
            Ok(format!("Onboarding started for {mention}."))
        }

        Command::ResetServer => {
            let report = manager.reset().await?;
            Ok(format!(
                "Reset complete: {} roles and {} channels removed.",
                report.removed_roles.len(),
                report.removed_workspaces.len()
            ))
        }

        Command::EmailCode { email, code } => {
            if !identity::is_syntactically_valid_email(&email) {
                return Ok(format!("{email} is not a valid email address."));
            }
            match deps.notifier.send_verification_code(&email, &code).await {
                Ok(()) => Ok(format!("Successfully sent code {code} to {email}.")),
                Err(e) => {
                    tracing::error!(to = %email, error = %e, "Manual code delivery failed");
                    Ok(format!("Failed to send code to {email}: {e}"))
                }
            }
        }
    }
}

/// Parse, authorise and run a command message, replying in its channel.
pub async fn dispatch(manager: &OnboardingManager, event: &Event) {
    let Event::MessageReceived {
        author,
        channel,
        content,
        author_roles,
        ..
    } = event
    else {
        return;
    };

    let reply = match CommandParser::parse(content) {
        Ok(None) => return,
        Ok(Some(command)) => {
            tracing::info!(caller = %author.id, ?command, "Admin command");
            match execute(manager, author_roles, command).await {
                Ok(reply) => reply,
                Err(CommandError::NotStaff) => {
                    tracing::warn!(caller = %author.id, "Command refused: caller is not staff");
                    return;
                }
                Err(CommandError::Onboarding(OnboardingError::AlreadyActive { member })) => {
                    format!("{} is already onboarding.", member.mention())
                }
                Err(e) => e.to_string(),
            }
        }
        Err(e) => e.to_string(),
    };

    if let Err(e) = manager.deps().messenger.send_message(*channel, &reply).await {
        tracing::warn!(channel = %channel, error = %e, "Failed to reply to command");
    }
}
