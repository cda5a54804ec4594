//! Out-of-band delivery of verification codes.
//!
//! Two backends: a SendGrid dynamic template over HTTPS, and plain SMTP via
//! lettre. The session treats delivery failure as non-fatal; it is logged
//! and audited, never shown to the member.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::error::NotifierError;

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Delivers a verification code to an email address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), NotifierError>;
}

/// SendGrid dynamic-template settings.
#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: SecretString,
    pub template_id: String,
    pub from_address: String,
}

/// SendGrid v3 mail-send client.
pub struct SendGridNotifier {
    config: SendGridConfig,
    endpoint: String,
    client: reqwest::Client,
}

impl SendGridNotifier {
    pub fn new(config: SendGridConfig) -> Self {
        Self {
            config,
            endpoint: SENDGRID_SEND_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the send endpoint (tests, sandboxes).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn payload(&self, email: &str, code: &str) -> serde_json::Value {
        json!({
            "personalizations": [{
                "to": [{ "email": email }],
                "dynamic_template_data": { "code": code },
            }],
            "from": { "email": self.config.from_address },
            "template_id": self.config.template_id,
        })
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), NotifierError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&self.payload(email, code))
            .send()
            .await
            .map_err(|e| NotifierError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %email, "Verification email sent via SendGrid");
        Ok(())
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Plain-text verification email over SMTP.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, email: &str, code: &str) -> Result<Message, NotifierError> {
        Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| NotifierError::InvalidAddress(format!("from: {e}")))?,
            )
            .to(email
                .parse()
                .map_err(|e| NotifierError::InvalidAddress(format!("to: {e}")))?)
            .subject("Your verification code")
            .body(verification_body(code))
            .map_err(|e| NotifierError::Smtp(format!("Failed to build email: {e}")))
    }
}

/// Body of the plain-text verification email.
pub fn verification_body(code: &str) -> String {
    format!(
        "Your verification code is {code}.\n\nReply with this code in your onboarding channel to finish joining."
    )
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), NotifierError> {
        let message = self.build_message(email, code)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            );
            let transport = SmtpTransport::relay(&config.host)
                .map_err(|e| NotifierError::Smtp(format!("SMTP relay error: {e}")))?
                .port(config.port)
                .credentials(creds)
                .build();
            transport
                .send(&message)
                .map(|_| ())
                .map_err(|e| NotifierError::Smtp(format!("SMTP send failed: {e}")))
        })
        .await
        .map_err(|e| NotifierError::Smtp(format!("SMTP task failed: {e}")))??;

        tracing::info!(to = %email, "Verification email sent via SMTP");
        Ok(())
    }
}
