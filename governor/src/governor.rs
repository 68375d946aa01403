//! Vote governor
//!
//! Owns the single in-flight vote and is the only code that mutates it.
//! Every operation runs its read-decide-write sequence under one
//! `std::sync::Mutex`, with no `.await` inside the critical section, so two
//! callers can never both observe `Active` and both resolve the vote.
//!
//! Terminal transitions funnel through one path: set the status, stop the
//! scheduler, clear the slot, queue the final render (and, for a passed vote,
//! the revocation). Side effects are queued while the lock is held and run
//! afterwards on the effect worker, so the status is already terminal before
//! any I/O starts.
//!
//! `Passed` means the community *decided*; it does not certify that every
//! guild's roles were actually cleared. Revocation failures are logged and
//! published as [`GovernorEvent::RevocationCompleted`] with a non-zero
//! `failed` count for manual follow-up.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::directory::UserDirectory;
use crate::effects::{Effect, EffectWorker};
use crate::error::{GovernorError, GovernorResult};
use crate::events::{GovernorEvent, SharedEventBus};
use crate::member::{Member, MemberId, MemberRef, RoleDescriptor, RoleId};
use crate::render::{NotificationSink, PayloadKind};
use crate::revocation::Revoker;
use crate::scheduler::ResolutionScheduler;
use crate::settings::{RunMode, VoteSettings};
use crate::vote::{Vote, VoteId, VoteStatus};
use crate::weights::{Weight, WeightTable};

/// Static governor configuration.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub weights: WeightTable,
    pub tick_period: Duration,
    pub mode: RunMode,
}

impl GovernorConfig {
    pub fn new(weights: WeightTable, settings: &VoteSettings, mode: RunMode) -> Self {
        Self {
            weights,
            tick_period: settings.tick_period,
            mode,
        }
    }
}

/// External collaborators the governor drives.
pub struct Collaborators {
    pub sink: Arc<dyn NotificationSink>,
    pub directory: Arc<dyn UserDirectory>,
    pub revoker: Revoker,
    pub events: SharedEventBus,
}

/// Parameters for [`VoteGovernor::create`].
#[derive(Debug, Clone)]
pub struct NewVote {
    pub instigator: MemberRef,
    pub target: MemberRef,
    pub role_snapshot: Vec<RoleDescriptor>,
    pub threshold: Weight,
    pub duration: Duration,
}

impl NewVote {
    /// Vote against `target` using the configured threshold and timeout.
    pub fn new(instigator: &Member, target: &Member, settings: &VoteSettings) -> Self {
        Self {
            instigator: instigator.to_ref(),
            target: target.to_ref(),
            role_snapshot: target.removable_roles(),
            threshold: settings.threshold,
            duration: settings.timeout,
        }
    }

    fn open(self, now: DateTime<Utc>) -> Vote {
        let expiry = chrono::Duration::from_std(self.duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Vote {
            id: VoteId::generate(),
            instigator: self.instigator,
            target: self.target,
            role_snapshot: self.role_snapshot,
            ballots: Default::default(),
            threshold: self.threshold,
            created_at: now,
            expiry,
            status: VoteStatus::Active,
        }
    }
}

#[derive(Default)]
struct GovernorState {
    active: Option<Vote>,
    /// Most recent terminal vote, kept to answer stale controls.
    last_resolved: Option<Vote>,
}

impl GovernorState {
    fn is_active(&self, vote_id: &VoteId) -> bool {
        self.active.as_ref().is_some_and(|v| &v.id == vote_id)
    }

    fn is_last_resolved(&self, vote_id: &VoteId) -> bool {
        self.last_resolved.as_ref().is_some_and(|v| &v.id == vote_id)
    }

    /// The active vote if `vote_id` names it.
    fn active_for(&mut self, vote_id: &VoteId) -> GovernorResult<&mut Vote> {
        if self.is_active(vote_id) {
            return self.active.as_mut().ok_or(GovernorError::NoActiveVote);
        }
        if self.is_last_resolved(vote_id) {
            Err(GovernorError::AlreadyResolved)
        } else {
            Err(GovernorError::NoActiveVote)
        }
    }
}

/// Shared reference to VoteGovernor
pub type SharedVoteGovernor = Arc<VoteGovernor>;

/// Owner of the single active vote.
pub struct VoteGovernor {
    weights: WeightTable,
    tick_period: Duration,
    state: Mutex<GovernorState>,
    scheduler: ResolutionScheduler,
    effects: mpsc::UnboundedSender<Effect>,
    events: SharedEventBus,
    this: Weak<VoteGovernor>,
}

impl VoteGovernor {
    /// Build a governor and spawn its effect worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: GovernorConfig, collaborators: Collaborators) -> SharedVoteGovernor {
        let (tx, rx) = mpsc::unbounded_channel();
        EffectWorker {
            sink: collaborators.sink,
            directory: collaborators.directory,
            revoker: collaborators.revoker,
            events: collaborators.events.clone(),
            mode: config.mode,
        }
        .spawn(rx);

        Arc::new_cyclic(|this| Self {
            weights: config.weights,
            tick_period: config.tick_period,
            state: Mutex::new(GovernorState::default()),
            scheduler: ResolutionScheduler::new(),
            effects: tx,
            events: collaborators.events,
            this: this.clone(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, effect: Effect) {
        if self.effects.send(effect).is_err() {
            warn!("Effect worker is gone; dropping side effect");
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Open a vote. Fails with `AlreadyActive` while another vote is running.
    pub fn create(&self, request: NewVote) -> GovernorResult<Vote> {
        let mut state = self.lock_state();
        if let Some(active) = &state.active {
            warn!(vote_id = %active.id, "Rejected vote creation: a vote is already active");
            return Err(GovernorError::AlreadyActive(active.id.clone()));
        }

        let vote = request.open(Utc::now());
        state.active = Some(vote.clone());

        let governor = self.this.clone();
        self.scheduler
            .start(vote.id.clone(), self.tick_period, move |vote_id| {
                if let Some(governor) = governor.upgrade() {
                    governor.evaluate_vote(vote_id);
                }
            });

        self.events.publish(GovernorEvent::VoteCreated {
            vote_id: vote.id.clone(),
            instigator: vote.instigator.id.clone(),
            target: vote.target.id.clone(),
            threshold: vote.threshold,
            expiry: vote.expiry,
            timestamp: vote.created_at,
        });
        self.dispatch(Effect::Render {
            vote: vote.clone(),
            kind: PayloadKind::Announce,
        });

        info!(
            vote_id = %vote.id,
            instigator = %vote.instigator.id,
            target = %vote.target.id,
            threshold = vote.threshold,
            expiry = %vote.expiry,
            "Vote started"
        );
        Ok(vote)
    }

    /// Record a ballot weighted by the heaviest role in `held_roles`.
    pub fn cast(
        &self,
        vote_id: &VoteId,
        voter: &MemberId,
        held_roles: &[RoleId],
    ) -> GovernorResult<Weight> {
        let mut state = self.lock_state();
        let vote = state.active_for(vote_id)?;

        if vote.ballots.contains_key(voter) {
            debug!(vote_id = %vote_id, voter = %voter, "Voter has already voted");
            return Err(GovernorError::AlreadyVoted);
        }
        let Some(weight) = self.weights.weight_of(held_roles) else {
            debug!(vote_id = %vote_id, voter = %voter, "Voter holds no weighted role");
            return Err(GovernorError::Ineligible);
        };

        vote.ballots.insert(voter.clone(), weight);
        let total = vote.total();
        info!(vote_id = %vote_id, voter = %voter, weight, total, "Ballot cast");
        self.events.publish(GovernorEvent::BallotCast {
            vote_id: vote_id.clone(),
            voter: voter.clone(),
            weight,
            total,
            timestamp: Utc::now(),
        });

        self.evaluate_locked(&mut state, Utc::now(), true);
        Ok(weight)
    }

    /// Withdraw `voter`'s ballot. The vote is re-evaluated either way.
    pub fn retract(&self, vote_id: &VoteId, voter: &MemberId) -> GovernorResult<Weight> {
        let mut state = self.lock_state();
        let vote = state.active_for(vote_id)?;

        let removed = vote.ballots.remove(voter);
        if let Some(weight) = removed {
            let total = vote.total();
            info!(vote_id = %vote_id, voter = %voter, weight, total, "Ballot retracted");
            self.events.publish(GovernorEvent::BallotRetracted {
                vote_id: vote_id.clone(),
                voter: voter.clone(),
                weight,
                total,
                timestamp: Utc::now(),
            });
        }

        self.evaluate_locked(&mut state, Utc::now(), true);
        removed.ok_or(GovernorError::NotFound)
    }

    /// Cancel the vote on behalf of its instigator.
    ///
    /// A resolution that is already due wins over the cancel: the vote is
    /// evaluated first and `AlreadyResolved` returned if that settles it.
    /// Cancelling a vote that resolved earlier re-renders its final state.
    pub fn cancel(&self, vote_id: &VoteId, requester: &MemberId) -> GovernorResult<Vote> {
        let mut state = self.lock_state();

        if state.is_active(vote_id) && self.evaluate_locked(&mut state, Utc::now(), false).is_some() {
            warn!(vote_id = %vote_id, "Vote resolved before it could be cancelled");
            return Err(GovernorError::AlreadyResolved);
        }

        let lookup = state
            .active_for(vote_id)
            .map(|vote| vote.instigator.id.clone());
        match lookup {
            Ok(instigator) if &instigator != requester => {
                warn!(vote_id = %vote_id, requester = %requester, "Cancel rejected: not the instigator");
                Err(GovernorError::NotInstigator)
            }
            Ok(_) => self
                .resolve_locked(&mut state, VoteStatus::Cancelled)
                .ok_or(GovernorError::NoActiveVote),
            Err(GovernorError::AlreadyResolved) => {
                if let Some(resolved) = &state.last_resolved {
                    self.dispatch(Effect::Render {
                        vote: resolved.clone(),
                        kind: PayloadKind::Update,
                    });
                }
                warn!(vote_id = %vote_id, "Vote has already been resolved; cannot cancel");
                Err(GovernorError::AlreadyResolved)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-evaluate whatever vote is active.
    ///
    /// Returns the evaluated vote's status; with no active vote, the status
    /// of the last resolved vote (or `None` if there never was one).
    pub fn evaluate(&self) -> Option<VoteStatus> {
        let mut state = self.lock_state();
        if state.active.is_none() {
            return state.last_resolved.as_ref().map(|v| v.status);
        }
        Some(
            self.evaluate_locked(&mut state, Utc::now(), true)
                .unwrap_or(VoteStatus::Active),
        )
    }

    /// Re-evaluate `vote_id` only if it is still the active vote.
    pub fn evaluate_vote(&self, vote_id: &VoteId) -> Option<VoteStatus> {
        let mut state = self.lock_state();
        if state.is_active(vote_id) {
            return Some(
                self.evaluate_locked(&mut state, Utc::now(), true)
                    .unwrap_or(VoteStatus::Active),
            );
        }
        if state.is_last_resolved(vote_id) {
            return state.last_resolved.as_ref().map(|v| v.status);
        }
        debug!(vote_id = %vote_id, "Evaluation for unknown vote ignored");
        None
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of the active vote.
    pub fn active(&self) -> Option<Vote> {
        self.lock_state().active.clone()
    }

    /// Snapshot of the most recently resolved vote.
    pub fn last_resolved(&self) -> Option<Vote> {
        self.lock_state().last_resolved.clone()
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn is_scheduled(&self, vote_id: &VoteId) -> bool {
        self.scheduler.is_running(vote_id)
    }

    /// Ticks delivered by the resolution scheduler so far.
    pub fn tick_count(&self) -> u64 {
        self.scheduler.tick_count()
    }

    /// Wait until every side effect queued so far has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.dispatch(Effect::Flush(tx));
        let _ = rx.await;
    }

    // =========================================================================
    // Resolution (lock held)
    // =========================================================================

    /// Apply the resolution policy to the active vote. Returns the terminal
    /// status if this call resolved it.
    fn evaluate_locked(
        &self,
        state: &mut GovernorState,
        now: DateTime<Utc>,
        render_active: bool,
    ) -> Option<VoteStatus> {
        let vote = state.active.as_ref()?;

        let decided = if vote.has_passed_threshold() {
            Some(VoteStatus::Passed)
        } else if vote.is_expired(now) {
            Some(VoteStatus::Failed)
        } else {
            None
        };

        match decided {
            Some(status) => {
                self.resolve_locked(state, status);
                Some(status)
            }
            None => {
                if render_active {
                    self.dispatch(Effect::Render {
                        vote: vote.clone(),
                        kind: PayloadKind::Update,
                    });
                }
                None
            }
        }
    }

    /// The single terminal transition.
    fn resolve_locked(&self, state: &mut GovernorState, status: VoteStatus) -> Option<Vote> {
        debug_assert!(status.is_terminal());
        let mut vote = state.active.take()?;
        vote.status = status;

        self.scheduler.stop(&vote.id);
        if status == VoteStatus::Passed {
            self.dispatch(Effect::Revoke { vote: vote.clone() });
        }
        self.dispatch(Effect::Render {
            vote: vote.clone(),
            kind: PayloadKind::Update,
        });
        self.events.publish(GovernorEvent::VoteResolved {
            vote_id: vote.id.clone(),
            status,
            total: vote.total(),
            timestamp: Utc::now(),
        });
        info!(
            vote_id = %vote.id,
            status = %status,
            total = vote.total(),
            threshold = vote.threshold,
            "Vote resolved"
        );

        state.last_resolved = Some(vote.clone());
        Some(vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::events::EventBus;
    use crate::member::GuildId;
    use crate::render::{SinkError, VotePayload};
    use crate::revocation::MockMemberAdmin;
    use crate::weights::RoleWeight;
    use async_trait::async_trait;

    struct NullSink;

    #[async_trait]
    impl NotificationSink for NullSink {
        async fn announce(&self, _payload: &VotePayload) -> Result<(), SinkError> {
            Ok(())
        }

        async fn update(&self, _payload: &VotePayload) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn governor_with(admin: MockMemberAdmin) -> SharedVoteGovernor {
        let config = GovernorConfig {
            weights: WeightTable::new(vec![RoleWeight::new("mod", 2), RoleWeight::new("member", 1)]),
            tick_period: Duration::from_secs(60),
            mode: RunMode::Production,
        };
        VoteGovernor::new(
            config,
            Collaborators {
                sink: Arc::new(NullSink),
                directory: Arc::new(MemoryDirectory::new()),
                revoker: Revoker::new(Arc::new(admin), GuildId::new("main")),
                events: EventBus::new().shared(),
            },
        )
    }

    fn request(threshold: Weight, duration: Duration) -> NewVote {
        NewVote {
            instigator: Member::new("1", "alice").to_ref(),
            target: Member::new("2", "mallory").to_ref(),
            role_snapshot: Vec::new(),
            threshold,
            duration,
        }
    }

    fn mod_role() -> Vec<RoleId> {
        vec![RoleId::new("mod")]
    }

    #[tokio::test]
    async fn test_second_create_is_rejected() {
        let governor = governor_with(MockMemberAdmin::new());
        let first = governor.create(request(5, Duration::from_secs(600))).unwrap();
        governor.cast(&first.id, &MemberId::new("10"), &mod_role()).unwrap();

        let err = governor
            .create(request(1, Duration::from_secs(600)))
            .unwrap_err();
        assert_eq!(err, GovernorError::AlreadyActive(first.id.clone()));

        let active = governor.active().unwrap();
        assert_eq!(active.id, first.id);
        assert_eq!(active.status, VoteStatus::Active);
        assert_eq!(active.total(), 2);
    }

    #[tokio::test]
    async fn test_pass_revokes_once_and_clears_slot() {
        let mut admin = MockMemberAdmin::new();
        admin.expect_clear_roles().times(1).returning(|_, _| Ok(vec![]));
        let governor = governor_with(admin);

        let vote = governor.create(request(3, Duration::from_secs(600))).unwrap();
        governor.cast(&vote.id, &MemberId::new("a"), &mod_role()).unwrap();
        assert_eq!(governor.active().unwrap().status, VoteStatus::Active);
        governor.cast(&vote.id, &MemberId::new("b"), &mod_role()).unwrap();

        assert!(governor.active().is_none());
        assert!(!governor.is_scheduled(&vote.id));
        assert_eq!(governor.last_resolved().unwrap().status, VoteStatus::Passed);
        assert_eq!(governor.evaluate(), Some(VoteStatus::Passed));
        governor.flush().await;
    }

    #[tokio::test]
    async fn test_expired_vote_fails_not_passes() {
        let mut admin = MockMemberAdmin::new();
        admin.expect_clear_roles().never();
        let governor = governor_with(admin);

        let vote = governor.create(request(1, Duration::ZERO)).unwrap();
        assert_eq!(governor.active().unwrap().status, VoteStatus::Active);
        assert_eq!(governor.evaluate(), Some(VoteStatus::Failed));
        assert!(!governor.is_scheduled(&vote.id));
        governor.flush().await;
    }

    #[tokio::test]
    async fn test_stale_vote_id_is_rejected() {
        let governor = governor_with(MockMemberAdmin::new());
        let vote = governor.create(request(5, Duration::from_secs(600))).unwrap();
        let stale = VoteId::new("not-this-one");

        assert_eq!(
            governor.cast(&stale, &MemberId::new("a"), &mod_role()),
            Err(GovernorError::NoActiveVote)
        );
        assert_eq!(governor.evaluate_vote(&stale), None);
        assert!(governor.active().unwrap().ballots.is_empty());

        governor.cancel(&vote.id, &MemberId::new("1")).unwrap();
        assert_eq!(
            governor.cast(&vote.id, &MemberId::new("a"), &mod_role()),
            Err(GovernorError::AlreadyResolved)
        );
    }
}
