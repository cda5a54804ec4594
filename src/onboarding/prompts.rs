//! Member-facing messages and staff audit lines for onboarding.

use std::time::Duration;

use crate::audit::AuditEntry;
use crate::platform::{ChannelId, Member, RoleId};

/// Reaction that starts onboarding.
pub const BEGIN_EMOJI: &str = "👋";
/// Reaction that pages support.
pub const HELP_EMOJI: &str = "🆘";
/// Reaction that finishes onboarding.
pub const CLEANUP_EMOJI: &str = "👍";

pub const WAVE_BACK: &str = "Waving back at ya! 👋 One second...";
pub const INTRO: &str = "In order to allow you to enter our Discord community, we need to complete a few quick onboarding steps...";
pub const CONDUCT_NOTICE: &str = "First, please read our **Code of Conduct**. Breaking any rules in the Code of Conduct will result in your prompt removal from the community.";
pub const EMAIL_INTRO: &str = "Now, we need to verify your email address.";
pub const INVALID_EMAIL: &str = "**Invalid response** - are you sure this is an email?";
pub const CODE_PROMPT: &str = "**Please reply here with the 6-digit code.**";
pub const INCORRECT_CODE: &str = "Incorrect code! Try again? (If you are stuck here, don't be afraid to hit the SOS reaction on the first message of this channel to request help!)";
pub const VERIFIED: &str =
    "🎉 Verification complete! Be sure to reach out to staff if you have any questions!";
pub const CLEANUP_PROMPT: &str =
    "React 👍 to this message to clean up this channel and unlock the rest of the community.";

/// The anchor message of every session.
pub fn welcome(community: &str, member: &Member) -> String {
    format!(
        "Welcome to **{community}**, {}! This is your personal onboarding channel. \
I'm Bouncer, the gatekeeper here, and I will be guiding you through the process.\
\n\nIf at any time, you feel like something is not working, please come back to this message \
and click the {HELP_EMOJI} button, and a staff member will be on their way to help you! \
\n\n(Click the {BEGIN_EMOJI} below to begin!)",
        member.mention()
    )
}

pub fn ack_prompt(keyword: &str) -> String {
    format!("**Please respond with `{keyword}` to acknowledge the Code of Conduct.**")
}

pub fn conduct_thanks(member: &Member) -> String {
    format!("Thank you for your agreement, {}!", member.name)
}

pub fn email_prompt(domain: &str) -> String {
    format!("**Please reply here with your @{domain} email address.**")
}

pub fn invalid_domain(domain: &str) -> String {
    format!("**Invalid domain.** Your email must end with {domain}.")
}

pub fn code_sent(email: &str) -> String {
    format!("📬 We just sent an email to **{email}**!")
}

pub fn help_requested(support: RoleId) -> String {
    format!(
        "Help requested! A staff member will be here to help you soon. {}",
        support.mention()
    )
}

// ── Audit lines ─────────────────────────────────────────────────────

pub fn audit_joined(member: &Member) -> AuditEntry {
    AuditEntry::info("👋 New member joined!", format!("Say welcome to {}!", member.name))
}

pub fn audit_role_assigned(member: &Member) -> AuditEntry {
    AuditEntry::success(
        format!("⏬ Starting to onboard {}... Step 1 complete!", member.name),
        format!("{} pending role assigned. Executing onboarding flow.", member.mention()),
    )
}

pub fn audit_provisioned(member: &Member, name: &str) -> AuditEntry {
    AuditEntry::success(
        step_complete(member, 2),
        format!("Role {name} created and assigned for {}.", member.mention()),
    )
}

pub fn audit_welcome_pending(member: &Member) -> AuditEntry {
    AuditEntry::warning(
        step_pending(member, 3),
        format!("{} ready to start onboarding. Waiting for reaction...", member.mention()),
    )
}

pub fn audit_welcome_done(member: &Member) -> AuditEntry {
    AuditEntry::success(
        step_complete(member, 3),
        format!("{} onboarding started!", member.mention()),
    )
}

pub fn audit_conduct_pending(member: &Member) -> AuditEntry {
    AuditEntry::warning(
        step_pending(member, 4),
        format!(
            "Conduct agreement sent to the welcome channel for {}. Awaiting acknowledgement...",
            member.mention()
        ),
    )
}

pub fn audit_conduct_done(member: &Member) -> AuditEntry {
    AuditEntry::success(
        step_complete(member, 4),
        format!("Conduct acknowledged by {}!", member.mention()),
    )
}

pub fn audit_email_pending(member: &Member) -> AuditEntry {
    AuditEntry::warning(
        step_pending(member, 5),
        format!(
            "Email prompt sent to the welcome channel for {}. Awaiting email...",
            member.mention()
        ),
    )
}

pub fn audit_email_done(member: &Member, email: &str) -> AuditEntry {
    AuditEntry::success(
        step_complete(member, 5),
        format!("Email collected from {}: {email}", member.mention()),
    )
}

/// `code` is `None` when codes are redacted from the audit trail.
pub fn audit_code_pending(member: &Member, email: &str, code: Option<u32>) -> AuditEntry {
    let what = match code {
        Some(code) => format!("Verification code {code}"),
        None => "Verification code (redacted)".to_string(),
    };
    AuditEntry::warning(
        step_pending(member, 6),
        format!(
            "{what} sent to {} at {email}. Awaiting user code input...",
            member.mention()
        ),
    )
}

pub fn audit_verified(member: &Member, email: &str) -> AuditEntry {
    AuditEntry::success(
        step_complete(member, 6),
        format!("{} email {email} verified successfully!", member.mention()),
    )
}

pub fn audit_unwatched(member: &Member) -> AuditEntry {
    AuditEntry::success(
        format!("✅ {} Onboarding Complete!", member.name),
        format!("{} removed from SOS watchlist.", member.mention()),
    )
}

pub fn audit_cleaned_up(member: &Member) -> AuditEntry {
    AuditEntry::success(
        format!("🧼 {} Onboarding Cleaned Up!", member.name),
        format!("{} onboarding role and channel deleted.", member.mention()),
    )
}

pub fn audit_code_undelivered(member: &Member, email: &str, reason: &str) -> AuditEntry {
    AuditEntry::error(
        format!("📭 Verification email for {} failed", member.name),
        format!(
            "Could not deliver the verification code to {email} for {}: {reason}",
            member.mention()
        ),
    )
}

pub fn audit_failed(member: &Member, reason: &str) -> AuditEntry {
    AuditEntry::error(
        format!("❌ Onboarding {} failed", member.name),
        format!("Onboarding {} stopped: {reason}", member.mention()),
    )
}

pub fn audit_abandoned(member: &Member, timeout: Option<Duration>) -> AuditEntry {
    let why = match timeout {
        Some(limit) => format!("did not respond within {}s", limit.as_secs()),
        None => "was cancelled".to_string(),
    };
    AuditEntry::warning(
        format!("⌛ Onboarding {} abandoned", member.name),
        format!("Onboarding for {} {why}.", member.mention()),
    )
}

pub fn audit_help_requested(requester: &Member, workspace: ChannelId) -> AuditEntry {
    AuditEntry::error(
        format!("🆘 Help requested by {}!", requester.name),
        format!(
            "{} just requested help in {}!",
            requester.name,
            workspace.mention()
        ),
    )
}

fn step_complete(member: &Member, n: u8) -> String {
    format!("⏬ Onboarding {}... Step {n} complete!", member.name)
}

fn step_pending(member: &Member, n: u8) -> String {
    format!("⏸ Onboarding {}... Step {n} pending...", member.name)
}
