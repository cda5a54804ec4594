//! Staff-facing audit trail.
//!
//! Every onboarding step writes one-line records here. The log-channel
//! auditor posts each record as a coloured embed in the staff log channel
//! and mirrors it into `tracing`. Records are fire-and-forget: delivery
//! failures are logged, never propagated.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::platform::{ChannelId, Embed, MessageId, Messenger};

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Unknown,
}

impl Severity {
    /// Embed colour for this severity.
    pub fn color(&self) -> u32 {
        match self {
            Self::Info => 0x3498db,
            Self::Success => 0x2ecc71,
            Self::Warning => 0xf1c40f,
            Self::Error => 0xe74c3c,
            Self::Unknown => 0x979c9f,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Falls back to a timestamped "New Log" title when absent.
    pub title: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl AuditEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            title: None,
            message: message.into(),
            severity,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message).with_title(title)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message).with_title(title)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message).with_title(title)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message).with_title(title)
    }

    /// The title actually shown.
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => format!(
                "New Log - {}",
                chrono::Local::now().format("%d/%m/%Y %H:%M:%S %Z")
            ),
        }
    }
}

/// Handle to a posted record, used to retract "pending" entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditHandle {
    pub channel: ChannelId,
    pub message: MessageId,
}

/// Sink for audit records.
#[async_trait]
pub trait Auditor: Send + Sync {
    /// Record an entry. Returns a handle when the record was delivered.
    async fn record(&self, entry: AuditEntry) -> Option<AuditHandle>;

    /// Remove a previously recorded entry.
    async fn retract(&self, handle: AuditHandle);
}

/// Posts audit records as embeds into the staff log channel.
pub struct LogChannelAuditor {
    messenger: Arc<dyn Messenger>,
    channel: ChannelId,
}

impl LogChannelAuditor {
    pub fn new(messenger: Arc<dyn Messenger>, channel: ChannelId) -> Self {
        Self { messenger, channel }
    }
}

#[async_trait]
impl Auditor for LogChannelAuditor {
    async fn record(&self, entry: AuditEntry) -> Option<AuditHandle> {
        if entry.message.is_empty() {
            return None;
        }
        let title = entry.display_title();
        match entry.severity {
            Severity::Error => tracing::error!(audit = %title, "{}", entry.message),
            Severity::Warning => tracing::warn!(audit = %title, "{}", entry.message),
            _ => tracing::info!(audit = %title, severity = %entry.severity, "{}", entry.message),
        }

        let embed = Embed {
            title,
            description: entry.message,
            color: entry.severity.color(),
        };
        match self.messenger.send_embed(self.channel, &embed).await {
            Ok(message) => Some(AuditHandle {
                channel: self.channel,
                message,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to post audit record");
                None
            }
        }
    }

    async fn retract(&self, handle: AuditHandle) {
        if let Err(e) = self
            .messenger
            .delete_message(handle.channel, handle.message)
            .await
        {
            tracing::warn!(error = %e, message = %handle.message, "Failed to retract audit record");
        }
    }
}
