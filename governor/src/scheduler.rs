//! Resolution scheduler
//!
//! Periodic tick source bound to a single vote. Each schedule runs as a Tokio
//! task driven by [`tokio::time::interval`] and is cancelled through its own
//! [`CancellationToken`]. Stopping is idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::vote::VoteId;

/// Periodic re-evaluation trigger for in-flight votes.
#[derive(Default)]
pub struct ResolutionScheduler {
    schedules: Mutex<HashMap<VoteId, CancellationToken>>,
    ticks: Arc<AtomicU64>,
}

impl ResolutionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<VoteId, CancellationToken>> {
        self.schedules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke `on_tick` every `period`, first after one full period.
    ///
    /// Restarting an id that is already scheduled replaces the old schedule.
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(&self, vote_id: VoteId, period: Duration, on_tick: F)
    where
        F: Fn(&VoteId) + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock().insert(vote_id.clone(), token.clone()) {
            previous.cancel();
        }

        let ticks = Arc::clone(&self.ticks);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(vote_id = %vote_id, "Resolution schedule stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        ticks.fetch_add(1, Ordering::Relaxed);
                        debug!(vote_id = %vote_id, "Resolution tick");
                        on_tick(&vote_id);
                    }
                }
            }
        });
    }

    /// Cancel future ticks for `vote_id`. Returns whether a schedule existed.
    pub fn stop(&self, vote_id: &VoteId) -> bool {
        match self.lock().remove(vote_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, vote_id: &VoteId) -> bool {
        self.lock().contains_key(vote_id)
    }

    /// Total ticks delivered across all schedules.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for ResolutionScheduler {
    fn drop(&mut self) {
        for (_, token) in self.lock().drain() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period_until_stopped() {
        let scheduler = ResolutionScheduler::new();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let vote = VoteId::new("v1");

        scheduler.start(vote.clone(), Duration::from_secs(10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 0, "first tick waits a full period");

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        assert!(scheduler.stop(&vote));
        settle().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 3, "no ticks after stop");
        assert_eq!(scheduler.tick_count(), 3);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let scheduler = ResolutionScheduler::new();
        let vote = VoteId::new("v1");
        scheduler.start(vote.clone(), Duration::from_secs(60), |_| {});

        assert!(scheduler.is_running(&vote));
        assert!(scheduler.stop(&vote));
        assert!(!scheduler.stop(&vote));
        assert!(!scheduler.is_running(&vote));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_schedule() {
        let scheduler = ResolutionScheduler::new();
        let seen = Arc::new(AtomicU64::new(0));
        let vote = VoteId::new("v1");

        for _ in 0..2 {
            let counter = Arc::clone(&seen);
            scheduler.start(vote.clone(), Duration::from_secs(10), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        settle().await;

        tokio::time::sleep(Duration::from_secs(15)).await;
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
