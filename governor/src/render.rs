//! Vote rendering
//!
//! [`render_vote`] turns a vote snapshot into a platform-neutral
//! [`VotePayload`]: accent colour, status text, ballot list and the three
//! ballot controls. Delivery is the job of a [`NotificationSink`]; the
//! governor calls it after every state change and only logs its failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::controls::{ControlId, ControlKind};
use crate::member::MemberId;
use crate::settings::RunMode;
use crate::vote::{Vote, VoteId, VoteStatus};

pub const VOTE_TITLE: &str = "Emergency Vote";
pub const NO_VOTES_TEXT: &str = "No votes yet.";

/// Accent colours, matching the platform's named palette.
pub mod colour {
    pub const DARK_ORANGE: u32 = 0xA8_43_00;
    pub const GREEN: u32 = 0x57_F2_87;
    pub const RED: u32 = 0xED_42_45;
    pub const GREY: u32 = 0x95_A5_A6;
}

/// Whether the payload opens a new vote message or edits the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Announce,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStyle {
    Primary,
    Secondary,
    Danger,
}

/// A rendered button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub kind: ControlKind,
    pub label: String,
    pub style: ControlStyle,
    pub custom_id: String,
    pub disabled: bool,
}

impl Control {
    fn for_vote(kind: ControlKind, vote: &VoteId, disabled: bool) -> Self {
        let (label, style) = match kind {
            ControlKind::Cast => ("Vote", ControlStyle::Primary),
            ControlKind::Retract => ("Remove Vote", ControlStyle::Secondary),
            ControlKind::Cancel => ("Cancel Vote", ControlStyle::Danger),
        };
        Self {
            kind,
            label: label.to_string(),
            style,
            custom_id: ControlId::vote(kind, vote.clone()).to_string(),
            disabled,
        }
    }
}

/// Everything a sink needs to display a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    pub vote_id: VoteId,
    pub kind: PayloadKind,
    pub status: VoteStatus,
    pub accent_colour: u32,
    pub title: String,
    pub body: String,
    pub ballots: String,
    pub controls: Vec<Control>,
    /// Mention line sent ahead of an announcement; never on updates.
    pub ping: Option<String>,
    pub ping_ids: Vec<MemberId>,
}

impl VotePayload {
    pub fn control(&self, kind: ControlKind) -> Option<&Control> {
        self.controls.iter().find(|c| c.kind == kind)
    }
}

/// Inputs to a render that do not live on the vote.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub now: DateTime<Utc>,
    pub mode: RunMode,
    pub kind: PayloadKind,
    /// Members to mention; only used for announcements.
    pub pings: Vec<MemberId>,
}

impl RenderContext {
    pub fn update(now: DateTime<Utc>, mode: RunMode) -> Self {
        Self {
            now,
            mode,
            kind: PayloadKind::Update,
            pings: Vec::new(),
        }
    }

    pub fn announce(now: DateTime<Utc>, mode: RunMode, pings: Vec<MemberId>) -> Self {
        Self {
            now,
            mode,
            kind: PayloadKind::Announce,
            pings,
        }
    }
}

/// Render a vote snapshot.
pub fn render_vote(vote: &Vote, ctx: &RenderContext) -> VotePayload {
    let accent_colour = match vote.status {
        VoteStatus::Active => colour::DARK_ORANGE,
        VoteStatus::Passed => colour::GREEN,
        VoteStatus::Failed => colour::RED,
        VoteStatus::Cancelled => colour::GREY,
    };

    let roles = if vote.role_snapshot.is_empty() {
        "No removable roles.".to_string()
    } else {
        vote.role_snapshot
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut body = format!(
        "{} ({}) has begun a vote to remove {} ({})'s roles.\n\nThe roles removed would be:\n{}",
        vote.instigator.id.mention(),
        vote.instigator.username,
        vote.target.id.mention(),
        vote.target.username,
        roles,
    );
    body.push_str(&format!("\n\nVotes: {}/{}", vote.total(), vote.threshold));

    match vote.status {
        VoteStatus::Active => body.push_str(&format!(
            "\nTime remaining: {}",
            format_remaining(vote.remaining(ctx.now))
        )),
        VoteStatus::Passed => body.push_str(&format!(
            "\n\nThe vote has passed with {} votes.",
            vote.ballots.len()
        )),
        VoteStatus::Failed => body.push_str("\n\nThe vote has failed."),
        VoteStatus::Cancelled => body.push_str("\n\nThe vote has been cancelled."),
    }

    match ctx.mode {
        RunMode::Test => body.push_str("\n\n-# Operating in test mode."),
        RunMode::Development => body.push_str("\n\n-# Operating in dev mode."),
        RunMode::Production => {}
    }

    let ballots = if vote.ballots.is_empty() {
        NO_VOTES_TEXT.to_string()
    } else {
        vote.sorted_ballots()
            .into_iter()
            .map(|(voter, weight)| format!("- **{}** - {}", voter.mention(), weight))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let disabled = vote.status.is_terminal();
    let controls = ControlKind::all()
        .iter()
        .map(|kind| Control::for_vote(*kind, &vote.id, disabled))
        .collect();

    let (ping, ping_ids) = match ctx.kind {
        PayloadKind::Announce if !ctx.pings.is_empty() => (
            Some(ctx.pings.iter().map(MemberId::mention).collect::<String>()),
            ctx.pings.clone(),
        ),
        _ => (None, Vec::new()),
    };

    VotePayload {
        vote_id: vote.id.clone(),
        kind: ctx.kind,
        status: vote.status,
        accent_colour,
        title: VOTE_TITLE.to_string(),
        body,
        ballots,
        controls,
        ping,
        ping_ids,
    }
}

/// Compact `1h 5m` / `12m 30s` / `45s` rendering.
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Error type for payload delivery
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("No vote message has been announced for vote {0}")]
    MessageMissing(VoteId),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Delivery timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Destination for rendered votes.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Post a new vote message (preceded by the ping line, if any).
    async fn announce(&self, payload: &VotePayload) -> Result<(), SinkError>;

    /// Edit the vote message posted by `announce`.
    async fn update(&self, payload: &VotePayload) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{MemberRef, RoleDescriptor};
    use std::collections::BTreeMap;

    fn sample_vote(status: VoteStatus) -> Vote {
        let now = Utc::now();
        let mut ballots = BTreeMap::new();
        ballots.insert(MemberId::new("30"), 5);
        ballots.insert(MemberId::new("20"), 1);
        Vote {
            id: VoteId::new("abc"),
            instigator: MemberRef {
                id: MemberId::new("1"),
                username: "alice".into(),
            },
            target: MemberRef {
                id: MemberId::new("2"),
                username: "mallory".into(),
            },
            role_snapshot: vec![
                RoleDescriptor::new("10", "Moderator"),
                RoleDescriptor::new("11", "Helper"),
            ],
            ballots,
            threshold: 8,
            created_at: now,
            expiry: now + chrono::Duration::minutes(12) + chrono::Duration::seconds(30),
            status,
        }
    }

    #[test]
    fn test_active_render() {
        let vote = sample_vote(VoteStatus::Active);
        let payload = render_vote(&vote, &RenderContext::update(vote.created_at, RunMode::Production));

        assert_eq!(payload.accent_colour, colour::DARK_ORANGE);
        assert_eq!(payload.title, VOTE_TITLE);
        assert!(payload.body.contains("<@1> (alice) has begun a vote to remove <@2> (mallory)'s roles."));
        assert!(payload.body.contains("Moderator (10), Helper (11)"));
        assert!(payload.body.contains("Votes: 6/8"));
        assert!(payload.body.contains("Time remaining: 12m 30s"));
        assert!(!payload.body.contains("-#"));
        assert_eq!(payload.ballots, "- **<@20>** - 1\n- **<@30>** - 5");
        assert!(payload.controls.iter().all(|c| !c.disabled));
        assert!(payload.ping.is_none());
    }

    #[test]
    fn test_terminal_renders_disable_controls() {
        for (status, colour, line) in [
            (VoteStatus::Passed, colour::GREEN, "The vote has passed with 2 votes."),
            (VoteStatus::Failed, colour::RED, "The vote has failed."),
            (VoteStatus::Cancelled, colour::GREY, "The vote has been cancelled."),
        ] {
            let vote = sample_vote(status);
            let payload =
                render_vote(&vote, &RenderContext::update(vote.created_at, RunMode::Production));
            assert_eq!(payload.accent_colour, colour);
            assert!(payload.body.contains(line), "{status}: {}", payload.body);
            assert!(!payload.body.contains("Time remaining"));
            assert_eq!(payload.controls.len(), 3);
            assert!(payload.controls.iter().all(|c| c.disabled));
        }
    }

    #[test]
    fn test_controls_carry_vote_id() {
        let vote = sample_vote(VoteStatus::Active);
        let payload = render_vote(&vote, &RenderContext::update(vote.created_at, RunMode::Production));

        let cast = payload.control(ControlKind::Cast).unwrap();
        assert_eq!(cast.label, "Vote");
        assert_eq!(cast.style, ControlStyle::Primary);
        assert_eq!(
            cast.custom_id.parse::<ControlId>().unwrap(),
            ControlId::vote(ControlKind::Cast, vote.id.clone())
        );
        assert_eq!(payload.control(ControlKind::Retract).unwrap().label, "Remove Vote");
        assert_eq!(
            payload.control(ControlKind::Cancel).unwrap().style,
            ControlStyle::Danger
        );
    }

    #[test]
    fn test_empty_vote_and_mode_banner() {
        let mut vote = sample_vote(VoteStatus::Active);
        vote.ballots.clear();
        vote.role_snapshot.clear();
        let payload = render_vote(&vote, &RenderContext::update(vote.created_at, RunMode::Test));

        assert_eq!(payload.ballots, NO_VOTES_TEXT);
        assert!(payload.body.contains("No removable roles."));
        assert!(payload.body.contains("-# Operating in test mode."));
    }

    #[test]
    fn test_announce_carries_ping_line() {
        let vote = sample_vote(VoteStatus::Active);
        let pings = vec![MemberId::new("5"), MemberId::new("6")];
        let payload = render_vote(
            &vote,
            &RenderContext::announce(vote.created_at, RunMode::Production, pings.clone()),
        );
        assert_eq!(payload.kind, PayloadKind::Announce);
        assert_eq!(payload.ping.as_deref(), Some("<@5><@6>"));
        assert_eq!(payload.ping_ids, pings);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(chrono::Duration::seconds(45)), "45s");
        assert_eq!(format_remaining(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_remaining(chrono::Duration::seconds(3900)), "1h 5m");
        assert_eq!(format_remaining(chrono::Duration::seconds(-3)), "0s");
    }
}
