//! Error types for Bouncer.

use std::time::Duration;

use crate::onboarding::state::OnboardingStep;
use crate::platform::UserId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No email backend configured. {hint}")]
    NoNotifier { hint: String },
}

/// Errors from the chat platform (workspace provisioning and messaging).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Forbidden: missing permission to {action}")]
    Forbidden { action: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether this error means the agent lacks permission for the action.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

/// Errors from outbound verification-code delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Email provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Onboarding state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Member {member} already has an onboarding session in progress")]
    AlreadyActive { member: UserId },

    #[error("Input {input} is not valid in step {step}")]
    UnexpectedInput { step: OnboardingStep, input: String },

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: OnboardingStep,
        to: OnboardingStep,
    },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Administrative command errors.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Caller does not hold the staff role")]
    NotStaff,

    #[error("Usage: {0}")]
    Usage(String),

    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
