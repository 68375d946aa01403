//! Recall Governor Library
//!
//! A community-run recall vote: any member may open a vote to strip another
//! member's roles; weighted ballots are collected until the threshold is met
//! or the vote times out. At most one vote is in flight at a time, and a
//! passing vote revokes the target's roles exactly once.
//!
//! # Components
//!
//! ## Core
//! - [`VoteGovernor`]: owns the active vote and every state transition
//! - [`WeightTable`]: role-to-weight mapping, heaviest role wins
//! - [`ResolutionScheduler`]: periodic re-evaluation of the active vote
//!
//! ## Effects
//! - [`NotificationSink`]: delivers rendered votes ([`render_vote`])
//! - [`Revoker`] / [`MemberAdmin`]: clears roles across guilds
//! - [`UserDirectory`]: weighted members to ping when a vote opens
//! - [`EventBus`]: broadcast of every governor event
//!
//! # Usage
//!
//! ```ignore
//! let governor = VoteGovernor::new(config, collaborators);
//! let vote = governor.create(NewVote::new(&instigator, &target, &settings))?;
//! governor.cast(&vote.id, &voter.id, &voter.role_ids())?;
//! ```

pub mod controls;
pub mod directory;
mod effects;
pub mod error;
pub mod events;
pub mod governor;
pub mod member;
pub mod render;
pub mod revocation;
pub mod scheduler;
pub mod settings;
pub mod vote;
pub mod weights;

// Re-export key governor types
pub use governor::{Collaborators, GovernorConfig, NewVote, SharedVoteGovernor, VoteGovernor};
pub use error::{GovernorError, GovernorResult};
pub use vote::{Vote, VoteId, VoteStatus};
pub use weights::{RoleWeight, Weight, WeightTable, WeightTableError};

// Re-export member and control types
pub use controls::{ControlId, ControlIdError, ControlKind};
pub use member::{GuildId, Member, MemberId, MemberRef, RoleDescriptor, RoleId};

// Re-export effect seams
pub use directory::{
    sync_member, DirectoryEntry, DirectoryError, JsonFileDirectory, MemoryDirectory, SyncOutcome,
    UserDirectory,
};
pub use events::{EventBus, GovernorEvent, SharedEventBus};
pub use render::{render_vote, NotificationSink, RenderContext, SinkError, VotePayload};
pub use revocation::{MemberAdmin, RevocationError, RevocationReport, Revoker};
pub use scheduler::ResolutionScheduler;
pub use settings::{RunMode, VoteSettings};
