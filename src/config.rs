//! Configuration, loaded from environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::notifier::{SendGridConfig, SmtpConfig};
use crate::platform::{ChannelId, RoleId, UserId};

pub const DEFAULT_ACK_KEYWORD: &str = "agree";
pub const DEFAULT_COMMUNITY_NAME: &str = "Build the Future Community";
pub const DEFAULT_CONDUCT_URL: &str =
    "https://docs.google.com/document/d/1H9ammGSeypqZufuMT3Qn8Lcb-gBPxxoZ3PjDrDcUZis/edit";
pub const DEFAULT_FROM_ADDRESS: &str = "btf@orph.app";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Role and channel identifiers of the community.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildLayout {
    /// Held by members while onboarding.
    pub pending_role: RoleId,
    /// Granted when onboarding completes.
    pub member_role: RoleId,
    /// Paged on help requests.
    pub support_role: RoleId,
    /// Required for administrative commands.
    pub staff_role: RoleId,
    pub log_channel: ChannelId,
    /// Category under which temporary workspaces are created.
    pub verification_area: ChannelId,
}

/// Settings for the onboarding flow itself.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub layout: GuildLayout,
    /// The agent's own user; its reactions and messages never advance a session.
    pub bot_user: UserId,
    /// Email addresses must end with this suffix.
    pub allowed_domain: String,
    /// Keyword that acknowledges the code of conduct (case-insensitive).
    pub ack_keyword: String,
    pub conduct_url: String,
    pub community_name: String,
    /// Length of one typing-pause beat between messages.
    pub pacing: Duration,
    /// Upper bound on each wait; `None` waits forever.
    pub step_timeout: Option<Duration>,
    /// Only the session's member may answer text prompts.
    pub member_replies_only: bool,
    /// Write verification codes in clear to the audit trail.
    pub audit_plaintext_codes: bool,
}

impl OnboardingConfig {
    pub fn new(layout: GuildLayout, bot_user: UserId, allowed_domain: impl Into<String>) -> Self {
        Self {
            layout,
            bot_user,
            allowed_domain: allowed_domain.into(),
            ack_keyword: DEFAULT_ACK_KEYWORD.to_string(),
            conduct_url: DEFAULT_CONDUCT_URL.to_string(),
            community_name: DEFAULT_COMMUNITY_NAME.to_string(),
            pacing: Duration::from_millis(1000),
            step_timeout: None,
            member_replies_only: true,
            audit_plaintext_codes: false,
        }
    }
}

/// Which email backend delivers verification codes.
#[derive(Debug, Clone)]
pub enum NotifierConfig {
    SendGrid(SendGridConfig),
    Smtp(SmtpConfig),
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct BouncerConfig {
    pub discord_token: SecretString,
    pub guild_id: u64,
    pub onboarding: OnboardingConfig,
    pub notifier: NotifierConfig,
    pub listen_addr: String,
    /// Bearer secret required on `POST /api/events`, if set.
    pub events_secret: Option<SecretString>,
}

impl BouncerConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let layout = GuildLayout {
            pending_role: RoleId(env.id("PENDING_ROLE_ID")?),
            member_role: RoleId(env.id("MEMBER_ROLE_ID")?),
            support_role: RoleId(env.id("SUPPORT_ROLE_ID")?),
            staff_role: RoleId(env.id("STAFF_ROLE_ID")?),
            log_channel: ChannelId(env.id("LOG_CHANNEL_ID")?),
            verification_area: ChannelId(env.id("VERIFICATION_CATEGORY_ID")?),
        };

        let mut onboarding = OnboardingConfig::new(
            layout,
            UserId(env.id("DISCORD_BOT_USER_ID")?),
            env.required("VALID_DOMAIN")?,
        );
        if let Some(keyword) = env.optional("BOUNCER_ACK_KEYWORD") {
            onboarding.ack_keyword = keyword.to_lowercase();
        }
        if let Some(url) = env.optional("BOUNCER_CONDUCT_URL") {
            onboarding.conduct_url = url;
        }
        if let Some(name) = env.optional("BOUNCER_COMMUNITY_NAME") {
            onboarding.community_name = name;
        }
        if let Some(ms) = env.parsed::<u64>("BOUNCER_PACING_MS")? {
            onboarding.pacing = Duration::from_millis(ms);
        }
        onboarding.step_timeout = env
            .parsed::<u64>("BOUNCER_STEP_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        if let Some(flag) = env.flag("BOUNCER_MEMBER_REPLIES_ONLY")? {
            onboarding.member_replies_only = flag;
        }
        if let Some(flag) = env.flag("BOUNCER_AUDIT_PLAINTEXT_CODES")? {
            onboarding.audit_plaintext_codes = flag;
        }

        let from_address = env
            .optional("BOUNCER_FROM_ADDRESS")
            .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string());
        let notifier = if let Some(api_key) = env.optional("SENDGRID_KEY") {
            NotifierConfig::SendGrid(SendGridConfig {
                api_key: SecretString::from(api_key),
                template_id: env.required("SENDGRID_TEMPLATE")?,
                from_address,
            })
        } else if let Some(host) = env.optional("EMAIL_SMTP_HOST") {
            NotifierConfig::Smtp(SmtpConfig {
                host,
                port: env.parsed::<u16>("EMAIL_SMTP_PORT")?.unwrap_or(587),
                username: env.optional("EMAIL_USERNAME").unwrap_or_default(),
                password: SecretString::from(env.optional("EMAIL_PASSWORD").unwrap_or_default()),
                from_address,
            })
        } else {
            return Err(ConfigError::NoNotifier {
                hint: "Set SENDGRID_KEY + SENDGRID_TEMPLATE, or EMAIL_SMTP_HOST.".into(),
            });
        };

        Ok(Self {
            discord_token: SecretString::from(env.required("DISCORD_TOKEN")?),
            guild_id: env.id("DISCORD_GUILD_ID")?,
            onboarding,
            notifier,
            listen_addr: env
                .optional("BOUNCER_LISTEN_ADDR")
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            events_secret: env.optional("BOUNCER_EVENTS_SECRET").map(SecretString::from),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    fn id(&self, key: &str) -> Result<u64, ConfigError> {
        self.parsed::<u64>(key)?
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.optional(key)
            .map(|raw| match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected a boolean, got {other:?}"),
                }),
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DISCORD_TOKEN", "token"),
            ("DISCORD_GUILD_ID", "1"),
            ("DISCORD_BOT_USER_ID", "2"),
            ("PENDING_ROLE_ID", "10"),
            ("MEMBER_ROLE_ID", "11"),
            ("SUPPORT_ROLE_ID", "12"),
            ("STAFF_ROLE_ID", "13"),
            ("LOG_CHANNEL_ID", "20"),
            ("VERIFICATION_CATEGORY_ID", "21"),
            ("VALID_DOMAIN", "berkeley.edu"),
            ("SENDGRID_KEY", "SG.key"),
            ("SENDGRID_TEMPLATE", "d-abc"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<BouncerConfig, ConfigError> {
        BouncerConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.guild_id, 1);
        assert_eq!(config.onboarding.layout.pending_role, RoleId(10));
        assert_eq!(config.onboarding.layout.verification_area, ChannelId(21));
        assert_eq!(config.onboarding.ack_keyword, "agree");
        assert_eq!(config.onboarding.step_timeout, None);
        assert!(config.onboarding.member_replies_only);
        assert!(!config.onboarding.audit_plaintext_codes);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(config.events_secret.is_none());
        assert!(matches!(config.notifier, NotifierConfig::SendGrid(_)));
    }

    #[test]
    fn missing_required_var() {
        let mut env = base_env();
        env.remove("VALID_DOMAIN");
        match load(&env) {
            Err(ConfigError::MissingEnvVar(key)) => assert_eq!(key, "VALID_DOMAIN"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_id() {
        let mut env = base_env();
        env.insert("MEMBER_ROLE_ID", "member");
        assert!(matches!(
            load(&env),
            Err(ConfigError::InvalidValue { key, .. }) if key == "MEMBER_ROLE_ID"
        ));
    }

    #[test]
    fn overrides() {
        let mut env = base_env();
        env.insert("BOUNCER_STEP_TIMEOUT_SECS", "900");
        env.insert("BOUNCER_PACING_MS", "0");
        env.insert("BOUNCER_MEMBER_REPLIES_ONLY", "false");
        env.insert("BOUNCER_AUDIT_PLAINTEXT_CODES", "yes");
        env.insert("BOUNCER_ACK_KEYWORD", "Accept");
        let config = load(&env).unwrap();
        assert_eq!(config.onboarding.step_timeout, Some(Duration::from_secs(900)));
        assert_eq!(config.onboarding.pacing, Duration::ZERO);
        assert!(!config.onboarding.member_replies_only);
        assert!(config.onboarding.audit_plaintext_codes);
        assert_eq!(config.onboarding.ack_keyword, "accept");
    }

    #[test]
    fn bad_flag() {
        let mut env = base_env();
        env.insert("BOUNCER_MEMBER_REPLIES_ONLY", "maybe");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn smtp_fallback_and_no_backend() {
        let mut env = base_env();
        env.remove("SENDGRID_KEY");
        env.insert("EMAIL_SMTP_HOST", "smtp.example.com");
        let config = load(&env).unwrap();
        match config.notifier {
            NotifierConfig::Smtp(smtp) => {
                assert_eq!(smtp.host, "smtp.example.com");
                assert_eq!(smtp.port, 587);
            }
            other => panic!("unexpected {other:?}"),
        }

        env.remove("EMAIL_SMTP_HOST");
        assert!(matches!(load(&env), Err(ConfigError::NoNotifier { .. })));
    }
}
