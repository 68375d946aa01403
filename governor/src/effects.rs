//! Side-effect worker
//!
//! The governor never performs I/O while holding its state lock. Instead it
//! queues [`Effect`]s, in state order, onto an unbounded channel drained by a
//! single worker task. One consumer means renders land in the order the
//! state changed, so a terminal render is never overwritten by an older one.
//!
//! Revocations run on their own task so a slow guild never holds back
//! renders. Every sink and guild call is bounded by a timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::directory::{ping_list, UserDirectory};
use crate::events::{GovernorEvent, SharedEventBus};
use crate::render::{render_vote, NotificationSink, PayloadKind, RenderContext, SinkError};
use crate::revocation::Revoker;
use crate::settings::RunMode;
use crate::vote::Vote;

/// Upper bound on a single `announce` or `update` call.
pub(crate) const SINK_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) enum Effect {
    Render { vote: Vote, kind: PayloadKind },
    Revoke { vote: Vote },
    /// Acknowledged once every earlier render has finished and every
    /// revocation started so far has completed.
    Flush(oneshot::Sender<()>),
}

pub(crate) struct EffectWorker {
    pub sink: Arc<dyn NotificationSink>,
    pub directory: Arc<dyn UserDirectory>,
    pub revoker: Revoker,
    pub events: SharedEventBus,
    pub mode: RunMode,
}

impl EffectWorker {
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<Effect>) -> JoinHandle<()> {
        tokio::spawn(async move {
            // Revocations not yet awaited by a flush, plus the previous flush
            // waiter so flushes complete in order.
            let mut pending: Vec<JoinHandle<()>> = Vec::new();
            while let Some(effect) = rx.recv().await {
                match effect {
                    Effect::Render { vote, kind } => self.render(vote, kind).await,
                    Effect::Revoke { vote } => {
                        pending.retain(|task| !task.is_finished());
                        pending.push(self.spawn_revocation(vote));
                    }
                    Effect::Flush(ack) => {
                        pending.retain(|task| !task.is_finished());
                        if pending.is_empty() {
                            let _ = ack.send(());
                        } else {
                            let waiting = std::mem::take(&mut pending);
                            pending.push(tokio::spawn(async move {
                                for task in waiting {
                                    let _ = task.await;
                                }
                                let _ = ack.send(());
                            }));
                        }
                    }
                }
            }
            debug!("Effect worker stopped");
        })
    }

    async fn render(&self, vote: Vote, kind: PayloadKind) {
        let now = Utc::now();
        let result = match kind {
            PayloadKind::Announce => {
                let pings = match ping_list(self.directory.as_ref(), &vote.instigator.id).await {
                    Ok(pings) => pings,
                    Err(e) => {
                        warn!(vote_id = %vote.id, "Failed to fetch users for ping list: {}", e);
                        vec![vote.instigator.id.clone()]
                    }
                };
                let payload = render_vote(&vote, &RenderContext::announce(now, self.mode, pings));
                tokio::time::timeout(SINK_TIMEOUT, self.sink.announce(&payload)).await
            }
            PayloadKind::Update => {
                let payload = render_vote(&vote, &RenderContext::update(now, self.mode));
                tokio::time::timeout(SINK_TIMEOUT, self.sink.update(&payload)).await
            }
        }
        .unwrap_or(Err(SinkError::TimedOut(SINK_TIMEOUT)));

        if let Err(e) = result {
            warn!(vote_id = %vote.id, status = %vote.status, "Failed to deliver vote message: {}", e);
            self.events.publish(GovernorEvent::RenderFailed {
                vote_id: vote.id.clone(),
                error: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    fn spawn_revocation(&self, vote: Vote) -> JoinHandle<()> {
        let revoker = self.revoker.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let report = revoker.revoke(&vote.target.id).await;
            if report.failed() > 0 {
                warn!(
                    vote_id = %vote.id,
                    target = %vote.target.id,
                    failed = report.failed(),
                    "Vote passed but revocation was incomplete; manual follow-up required"
                );
            }
            events.publish(GovernorEvent::RevocationCompleted {
                vote_id: vote.id,
                target: vote.target.id,
                succeeded: report.succeeded(),
                failed: report.failed(),
                skipped: report.skipped,
                timestamp: Utc::now(),
            });
        })
    }
}
