//! Interactive control identifiers
//!
//! Every button and modal the bot renders carries a custom id that routes the
//! callback back here. Ids are a small colon-separated grammar:
//!
//! ```text
//! recall:cast:<vote>
//! recall:retract:<vote>
//! recall:cancel:<vote>
//! recall:confirm:<target>:<channel>
//! ```
//!
//! Anything else is rejected at the boundary before dispatch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::member::MemberId;
use crate::vote::VoteId;

const PREFIX: &str = "recall";

/// Platform limit on custom id length.
pub const MAX_CONTROL_ID_LEN: usize = 100;

/// The three ballot controls attached to a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Cast,
    Retract,
    Cancel,
}

impl ControlKind {
    pub fn all() -> &'static [ControlKind] {
        &[ControlKind::Cast, ControlKind::Retract, ControlKind::Cancel]
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Cast => "cast",
            Self::Retract => "retract",
            Self::Cancel => "cancel",
        }
    }
}

/// A decoded control id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlId {
    /// Ballot control on a rendered vote.
    Vote { kind: ControlKind, vote: VoteId },
    /// Confirmation modal for starting a vote against `target`.
    ConfirmStart { target: MemberId, channel: String },
}

impl ControlId {
    pub fn vote(kind: ControlKind, vote: VoteId) -> Self {
        Self::Vote { kind, vote }
    }
}

/// Error type for control id decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlIdError {
    #[error("Control id '{0}' is not a recall control")]
    Foreign(String),

    #[error("Unknown control kind '{0}'")]
    UnknownKind(String),

    #[error("Control '{0}' is missing its payload")]
    MissingPayload(String),

    #[error("Control id exceeds {MAX_CONTROL_ID_LEN} characters")]
    TooLong,
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vote { kind, vote } => write!(f, "{PREFIX}:{}:{vote}", kind.tag()),
            Self::ConfirmStart { target, channel } => {
                write!(f, "{PREFIX}:confirm:{target}:{channel}")
            }
        }
    }
}

impl FromStr for ControlId {
    type Err = ControlIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.len() > MAX_CONTROL_ID_LEN {
            return Err(ControlIdError::TooLong);
        }

        let mut parts = raw.split(':');
        if parts.next() != Some(PREFIX) {
            return Err(ControlIdError::Foreign(raw.to_string()));
        }
        let tag = parts
            .next()
            .ok_or_else(|| ControlIdError::Foreign(raw.to_string()))?;
        let mut payload = |tag: &str| {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ControlIdError::MissingPayload(tag.to_string()))
        };

        let id = match tag {
            "cast" => Self::vote(ControlKind::Cast, VoteId::new(payload(tag)?)),
            "retract" => Self::vote(ControlKind::Retract, VoteId::new(payload(tag)?)),
            "cancel" => Self::vote(ControlKind::Cancel, VoteId::new(payload(tag)?)),
            "confirm" => {
                let target = MemberId::new(payload(tag)?);
                let channel = payload(tag)?;
                Self::ConfirmStart { target, channel }
            }
            other => return Err(ControlIdError::UnknownKind(other.to_string())),
        };

        if parts.next().is_some() {
            return Err(ControlIdError::Foreign(raw.to_string()));
        }
        Ok(id)
    }
}
