//! Gateway events and the in-process event bus.
//!
//! [`EventBus`] fans every [`Event`] out to all subscribers over a
//! `tokio::sync::broadcast` channel. A workflow suspends on
//! [`Subscription::wait_for`] until an event matching its predicate arrives,
//! the wait is cancelled, or an optional deadline passes. Subscribers never
//! consume each other's events: every subscriber sees every event published
//! after it subscribed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::platform::{ChannelId, Member, MessageId, RoleId, UserId};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// An event delivered by the chat platform gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MemberJoined {
        member: Member,
    },
    ReactionAdded {
        user: Member,
        channel: ChannelId,
        message: MessageId,
        emoji: String,
        #[serde(default)]
        from_bot: bool,
    },
    MessageReceived {
        author: Member,
        channel: ChannelId,
        message: MessageId,
        content: String,
        #[serde(default)]
        author_roles: Vec<RoleId>,
        #[serde(default)]
        from_bot: bool,
    },
}

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MemberJoined,
    ReactionAdded,
    MessageReceived,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MemberJoined { .. } => EventKind::MemberJoined,
            Self::ReactionAdded { .. } => EventKind::ReactionAdded,
            Self::MessageReceived { .. } => EventKind::MessageReceived,
        }
    }

    /// The user behind the event.
    pub fn actor(&self) -> UserId {
        match self {
            Self::MemberJoined { member } => member.id,
            Self::ReactionAdded { user, .. } => user.id,
            Self::MessageReceived { author, .. } => author.id,
        }
    }

    pub fn reaction(member: Member, channel: ChannelId, message: MessageId, emoji: &str) -> Self {
        Self::ReactionAdded {
            user: member,
            channel,
            message,
            emoji: emoji.to_string(),
            from_bot: false,
        }
    }

    pub fn message(author: Member, channel: ChannelId, content: &str) -> Self {
        Self::MessageReceived {
            author,
            channel,
            message: MessageId(0),
            content: content.to_string(),
            author_roles: Vec::new(),
            from_bot: false,
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Matched(Event),
    TimedOut,
    Cancelled,
    /// The bus was dropped; no further events can arrive.
    Closed,
}

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest events are dropped and slow
    /// subscribers skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: Event) {
        // Zero receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A live subscription on the [`EventBus`].
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receive the next event, skipping over any lag.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Suspend until an event satisfies `predicate`.
    ///
    /// Returns early on cancellation or when `timeout` (if any) elapses.
    /// Non-matching events are discarded for this subscriber only.
    pub async fn wait_for<F>(
        &mut self,
        mut predicate: F,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> WaitOutcome
    where
        F: FnMut(&Event) -> bool,
    {
        let matched = async {
            while let Some(event) = self.next().await {
                if predicate(&event) {
                    return Some(event);
                }
            }
            None
        };
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            _ = deadline => WaitOutcome::TimedOut,
            event = matched => match event {
                Some(event) => WaitOutcome::Matched(event),
                None => WaitOutcome::Closed,
            },
        }
    }
}
