//! Process-wide session bookkeeping.
//!
//! Two maps: the SOS watch list keyed by anchor message, consulted by the
//! escalation handler, and the active sessions keyed by member, which
//! rejects a second concurrent session for the same member.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::platform::{ChannelId, Member, MessageId, UserId};

use super::state::OnboardingStep;

/// A session that can still be escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub session_id: Uuid,
    pub member: Member,
    pub workspace: ChannelId,
}

#[derive(Debug)]
struct ActiveSession {
    session_id: Uuid,
    member: Member,
    step: OnboardingStep,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Read-only view of a running session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub member: Member,
    pub step: OnboardingStep,
    pub started_at: DateTime<Utc>,
    pub sos_watched: bool,
}

/// Registry of live sessions and escalation anchors.
#[derive(Default)]
pub struct SessionRegistry {
    watched: RwLock<HashMap<MessageId, WatchEntry>>,
    active: RwLock<HashMap<UserId, ActiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching an anchor for help requests.
    pub async fn add(&self, anchor: MessageId, entry: WatchEntry) {
        tracing::debug!(anchor = %anchor, member = %entry.member.id, "Watching anchor");
        self.watched.write().await.insert(anchor, entry);
    }

    /// Stop watching an anchor. Only one caller ever gets the entry back.
    pub async fn remove(&self, anchor: MessageId) -> Option<WatchEntry> {
        self.watched.write().await.remove(&anchor)
    }

    pub async fn find(&self, anchor: MessageId) -> Option<WatchEntry> {
        self.watched.read().await.get(&anchor).cloned()
    }

    pub async fn watched_count(&self) -> usize {
        self.watched.read().await.len()
    }

    /// Reserve `member` for a new session.
    pub async fn claim(
        &self,
        member: &Member,
        cancel: CancellationToken,
    ) -> Result<Uuid, OnboardingError> {
        let mut active = self.active.write().await;
        if active.contains_key(&member.id) {
            return Err(OnboardingError::AlreadyActive { member: member.id });
        }
        let session_id = Uuid::new_v4();
        active.insert(
            member.id,
            ActiveSession {
                session_id,
                member: member.clone(),
                step: OnboardingStep::Created,
                started_at: Utc::now(),
                cancel,
            },
        );
        Ok(session_id)
    }

    /// Record the step a session has reached.
    pub async fn set_step(&self, session_id: Uuid, member: UserId, step: OnboardingStep) {
        if let Some(session) = self.active.write().await.get_mut(&member)
            && session.session_id == session_id
        {
            session.step = step;
        }
    }

    /// Drop a finished session. A stale `session_id` is ignored.
    pub async fn release(&self, session_id: Uuid, member: UserId) {
        let mut active = self.active.write().await;
        if active
            .get(&member)
            .is_some_and(|s| s.session_id == session_id)
        {
            active.remove(&member);
        }
    }

    pub async fn is_active(&self, member: UserId) -> bool {
        self.active.read().await.contains_key(&member)
    }

    /// Cancel every running session. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let active = self.active.read().await;
        for session in active.values() {
            session.cancel.cancel();
        }
        active.len()
    }

    /// Snapshot of running sessions, oldest first.
    pub async fn sessions(&self) -> Vec<SessionSummary> {
        let watched = self.watched.read().await;
        let active = self.active.read().await;
        let mut out: Vec<SessionSummary> = active
            .values()
            .map(|s| SessionSummary {
                session_id: s.session_id,
                member: s.member.clone(),
                step: s.step,
                started_at: s.started_at,
                sos_watched: watched.values().any(|w| w.session_id == s.session_id),
            })
            .collect();
        out.sort_by_key(|s| s.started_at);
        out
    }
}
