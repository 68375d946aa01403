//! Governor error types
//!
//! Every rejection the governor can return is a user-facing, non-fatal
//! outcome. Each carries a private notice for the requester through
//! [`GovernorError::user_message`]; the `Display` text is for logs.

use crate::vote::VoteId;

/// Result type alias for governor operations
pub type GovernorResult<T> = Result<T, GovernorError>;

/// Rejections produced by the vote governor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernorError {
    #[error("Vote {0} is already active")]
    AlreadyActive(VoteId),

    #[error("Voter holds no weighted role")]
    Ineligible,

    #[error("Voter already has a ballot on this vote")]
    AlreadyVoted,

    #[error("Voter has no ballot to retract")]
    NotFound,

    #[error("Only the instigator may cancel the vote")]
    NotInstigator,

    #[error("Vote has already been resolved")]
    AlreadyResolved,

    #[error("No active vote")]
    NoActiveVote,
}

impl GovernorError {
    /// Private notice shown to the member whose action was rejected.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AlreadyActive(_) => "There is already an active vote in progress.",
            Self::Ineligible => "You do not hold a role that is allowed to vote.",
            Self::AlreadyVoted => "You have already voted in this vote.",
            Self::NotFound => "You do not have a vote to remove.",
            Self::NotInstigator => "Only the member who started this vote can cancel it.",
            Self::AlreadyResolved => "This vote has already been resolved.",
            Self::NoActiveVote => "There is not an active vote.",
        }
    }
}
