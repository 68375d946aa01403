//! Vote message sink backed by the gateway outbox.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use recall_governor::render::PayloadKind;
use recall_governor::{NotificationSink, SinkError, VoteId, VotePayload};
use tracing::debug;

use crate::gateway::{GatewayMessage, Outbox};

/// Votes whose messages can still be edited: the one in flight and the
/// one before it, whose final state may be re-rendered by a stale control.
#[derive(Default)]
struct Announced {
    current: Option<VoteId>,
    previous: Option<VoteId>,
}

impl Announced {
    fn record(&mut self, vote_id: VoteId) {
        if self.current.as_ref() != Some(&vote_id) {
            self.previous = self.current.replace(vote_id);
        }
    }

    fn contains(&self, vote_id: &VoteId) -> bool {
        self.current.as_ref() == Some(vote_id) || self.previous.as_ref() == Some(vote_id)
    }
}

/// Posts vote messages to the configured vote channel.
pub struct GatewaySink {
    outbox: Outbox,
    channel_id: String,
    announced: Mutex<Announced>,
}

impl GatewaySink {
    pub fn new(outbox: Outbox, channel_id: impl Into<String>) -> Self {
        Self {
            outbox,
            channel_id: channel_id.into(),
            announced: Mutex::new(Announced::default()),
        }
    }

    fn deliver(&self, payload: &VotePayload) -> Result<(), SinkError> {
        self.outbox
            .send(GatewayMessage::VoteMessage {
                channel_id: self.channel_id.clone(),
                payload: payload.clone(),
            })
            .map_err(|e| SinkError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl NotificationSink for GatewaySink {
    async fn announce(&self, payload: &VotePayload) -> Result<(), SinkError> {
        debug_assert_eq!(payload.kind, PayloadKind::Announce);
        self.deliver(payload)?;
        self.announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(payload.vote_id.clone());
        debug!(vote_id = %payload.vote_id, pings = payload.ping_ids.len(), "Vote announced");
        Ok(())
    }

    async fn update(&self, payload: &VotePayload) -> Result<(), SinkError> {
        let known = self
            .announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&payload.vote_id);
        if !known {
            return Err(SinkError::MessageMissing(payload.vote_id.clone()));
        }
        self.deliver(payload)
    }
}
