//! The vote entity and its status machine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::member::{MemberId, MemberRef, RoleDescriptor};
use crate::weights::Weight;

/// Opaque token correlating control callbacks with a vote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(String);

impl VoteId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a vote.
///
/// Every vote starts `Active` and ends in exactly one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Active,
    Passed,
    Failed,
    Cancelled,
}

impl VoteStatus {
    /// Whether this is a terminal status (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A recall vote. Clones handed out by the governor are snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub instigator: MemberRef,
    pub target: MemberRef,
    /// Target's removable roles at creation; display only.
    pub role_snapshot: Vec<RoleDescriptor>,
    /// One ballot per voter.
    pub ballots: BTreeMap<MemberId, Weight>,
    pub threshold: Weight,
    pub created_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub status: VoteStatus,
}

impl Vote {
    /// Weighted sum of the ballots currently held.
    pub fn total(&self) -> u64 {
        self.ballots.values().map(|w| u64::from(*w)).sum()
    }

    pub fn has_passed_threshold(&self) -> bool {
        self.total() >= u64::from(self.threshold)
    }

    /// Expiry is inclusive: a vote is expired at its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.expiry - now).max(chrono::Duration::zero())
    }

    /// Ballots for display: lightest first, ties by voter id.
    pub fn sorted_ballots(&self) -> Vec<(&MemberId, Weight)> {
        let mut ballots: Vec<_> = self.ballots.iter().map(|(id, w)| (id, *w)).collect();
        ballots.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        ballots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote_with(ballots: &[(&str, Weight)]) -> Vote {
        let now = Utc::now();
        Vote {
            id: VoteId::new("v1"),
            instigator: MemberRef {
                id: MemberId::new("1"),
                username: "alice".into(),
            },
            target: MemberRef {
                id: MemberId::new("2"),
                username: "bob".into(),
            },
            role_snapshot: Vec::new(),
            ballots: ballots
                .iter()
                .map(|(id, w)| (MemberId::new(*id), *w))
                .collect(),
            threshold: 3,
            created_at: now,
            expiry: now + chrono::Duration::minutes(5),
            status: VoteStatus::Active,
        }
    }

    #[test]
    fn test_total_and_threshold() {
        let vote = vote_with(&[("a", 2)]);
        assert_eq!(vote.total(), 2);
        assert!(!vote.has_passed_threshold());

        let vote = vote_with(&[("a", 2), ("b", 1)]);
        assert!(vote.has_passed_threshold());
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let vote = vote_with(&[]);
        assert!(!vote.is_expired(vote.created_at));
        assert!(vote.is_expired(vote.expiry));
        assert_eq!(
            vote.remaining(vote.expiry + chrono::Duration::seconds(5)),
            chrono::Duration::zero()
        );
    }

    #[test]
    fn test_sorted_ballots_lightest_first() {
        let vote = vote_with(&[("c", 5), ("a", 1), ("b", 1)]);
        let order: Vec<_> = vote
            .sorted_ballots()
            .into_iter()
            .map(|(id, _)| id.as_str().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!VoteStatus::Active.is_terminal());
        assert!(VoteStatus::Passed.is_terminal());
        assert!(VoteStatus::Failed.is_terminal());
        assert!(VoteStatus::Cancelled.is_terminal());
    }
}
