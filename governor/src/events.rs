//! Governor event bus
//!
//! Every state change the governor makes, and the outcome of every side
//! effect it dispatches, is published as a [`GovernorEvent`] on a Tokio
//! broadcast channel. Publishing with no subscribers is not an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::member::MemberId;
use crate::vote::{VoteId, VoteStatus};
use crate::weights::Weight;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// All governor events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernorEvent {
    /// A vote was opened
    VoteCreated {
        vote_id: VoteId,
        instigator: MemberId,
        target: MemberId,
        threshold: Weight,
        expiry: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A ballot was accepted
    BallotCast {
        vote_id: VoteId,
        voter: MemberId,
        weight: Weight,
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// A ballot was withdrawn
    BallotRetracted {
        vote_id: VoteId,
        voter: MemberId,
        weight: Weight,
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// A vote reached a terminal status
    VoteResolved {
        vote_id: VoteId,
        status: VoteStatus,
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// The revocation side effect finished (possibly partially)
    RevocationCompleted {
        vote_id: VoteId,
        target: MemberId,
        succeeded: usize,
        failed: usize,
        skipped: bool,
        timestamp: DateTime<Utc>,
    },

    /// Delivering a rendered vote failed
    RenderFailed {
        vote_id: VoteId,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl GovernorEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::VoteCreated { .. } => "vote_created",
            Self::BallotCast { .. } => "ballot_cast",
            Self::BallotRetracted { .. } => "ballot_retracted",
            Self::VoteResolved { .. } => "vote_resolved",
            Self::RevocationCompleted { .. } => "revocation_completed",
            Self::RenderFailed { .. } => "render_failed",
        }
    }

    /// The vote this event concerns
    pub fn vote_id(&self) -> &VoteId {
        match self {
            Self::VoteCreated { vote_id, .. }
            | Self::BallotCast { vote_id, .. }
            | Self::BallotRetracted { vote_id, .. }
            | Self::VoteResolved { vote_id, .. }
            | Self::RevocationCompleted { vote_id, .. }
            | Self::RenderFailed { vote_id, .. } => vote_id,
        }
    }
}

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast-based event bus
pub struct EventBus {
    sender: broadcast::Sender<GovernorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: GovernorEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GovernorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(GovernorEvent::VoteResolved {
            vote_id: VoteId::new("v1"),
            status: VoteStatus::Failed,
            total: 0,
            timestamp: Utc::now(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type(), "vote_resolved");
        assert_eq!(e1, e2);
        assert_eq!(e1.vote_id().as_str(), "v1");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(GovernorEvent::RenderFailed {
            vote_id: VoteId::new("v1"),
            error: "gone".into(),
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_serialized_tag() {
        let event = GovernorEvent::BallotCast {
            vote_id: VoteId::new("v1"),
            voter: MemberId::new("7"),
            weight: 2,
            total: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ballot_cast");
        assert_eq!(json["voter"], "7");
    }
}
