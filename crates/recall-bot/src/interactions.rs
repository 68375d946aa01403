//! Interaction handlers
//!
//! Turns gateway events into governor calls and answers every interaction
//! with a private notice. Validation that needs platform state (guild,
//! membership, roles) happens here; everything about the vote itself is the
//! governor's decision.

use std::sync::Arc;

use async_trait::async_trait;
use recall_governor::directory::sync_member;
use recall_governor::{
    ControlId, ControlIdError, ControlKind, GuildId, Member, MemberId, NewVote,
    SharedVoteGovernor, UserDirectory, VoteId,
};
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::gateway::{Command, EventHandler, GatewayEvent, GatewayMessage, ModalInput, Outbox};
use crate::jobs::UserSync;
use crate::roster::Roster;

/// Id of the confirmation text input.
pub const CONFIRM_INPUT_ID: &str = "confirmVote";

const WRONG_GUILD: &str = "This command can only be used in the configured guild.";
const STALE_CONTROL: &str = "This control is no longer valid.";

/// Routes gateway events to the governor, the roster and the directory.
pub struct Interactions {
    config: Arc<BotConfig>,
    governor: SharedVoteGovernor,
    roster: Arc<Roster>,
    directory: Arc<dyn UserDirectory>,
    outbox: Outbox,
}

impl Interactions {
    pub fn new(
        config: Arc<BotConfig>,
        governor: SharedVoteGovernor,
        roster: Arc<Roster>,
        directory: Arc<dyn UserDirectory>,
        outbox: Outbox,
    ) -> Self {
        Self {
            config,
            governor,
            roster,
            directory,
            outbox,
        }
    }

    fn is_primary(&self, guild: &GuildId) -> bool {
        guild == &self.config.guild_id
    }

    /// Private notice, logged as a rejection.
    fn reject(&self, interaction_id: &str, invoker: &Member, action: &str, message: &str) {
        warn!(
            member = %invoker.id,
            username = %invoker.username,
            action,
            "{}",
            message
        );
        self.outbox.notice(interaction_id, message);
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn start_vote(
        &self,
        interaction_id: &str,
        guild: &GuildId,
        channel_id: &str,
        invoker: &Member,
        target: &MemberId,
    ) {
        if !self.is_primary(guild) {
            return self.reject(interaction_id, invoker, "start_vote", WRONG_GUILD);
        }
        if !self.config.may_start_vote(&invoker.role_ids()) {
            return self.reject(
                interaction_id,
                invoker,
                "start_vote",
                "You are not allowed to start a vote.",
            );
        }
        let Some(member) = self.roster.member(guild, target).await else {
            let message = format!("Could not find user {} in this guild.", target);
            return self.reject(interaction_id, invoker, "start_vote", &message);
        };
        if member.removable_roles().is_empty() {
            let message = format!(
                "User {} does not have any roles in this guild.",
                member.username
            );
            return self.reject(interaction_id, invoker, "start_vote", &message);
        }
        if let Some(active) = self.governor.active() {
            debug!(vote_id = %active.id, "Start requested while a vote is active");
            return self.reject(
                interaction_id,
                invoker,
                "start_vote",
                "There is already an active vote in progress.",
            );
        }

        let confirm = ControlId::ConfirmStart {
            target: member.id.clone(),
            channel: channel_id.to_string(),
        };
        let modal = GatewayMessage::ShowModal {
            interaction_id: interaction_id.to_string(),
            custom_id: confirm.to_string(),
            title: "Start Vote".into(),
            input: ModalInput {
                custom_id: CONFIRM_INPUT_ID.into(),
                label: "Are you sure you want to start a vote?".into(),
                placeholder: "Type 'yes' to confirm.".into(),
                min_length: 3,
                required: true,
            },
        };
        if self.outbox.send(modal).is_err() {
            warn!(interaction_id, "Could not show confirmation: gateway outbox is closed");
        }
    }

    async fn update_users(
        &self,
        interaction_id: &str,
        guild: &GuildId,
        invoker: &Member,
        scope: &crate::gateway::UpdateScope,
    ) {
        if !self.is_primary(guild) {
            return self.reject(interaction_id, invoker, "update_users", WRONG_GUILD);
        }
        let job = UserSync {
            directory: self.directory.as_ref(),
            weights: self.governor.weights(),
            roster: &self.roster,
            guild,
        };
        let summary = job.update_users(scope, invoker).await;
        self.outbox.notice(interaction_id, summary.to_string());
    }

    // =========================================================================
    // Confirmation modal
    // =========================================================================

    async fn confirm_start(
        &self,
        interaction_id: &str,
        guild: &GuildId,
        invoker: &Member,
        custom_id: &str,
        value: &str,
    ) {
        let (target, channel) = match custom_id.parse::<ControlId>() {
            Ok(ControlId::ConfirmStart { target, channel }) => (target, channel),
            Ok(_) | Err(_) => {
                return self.reject(
                    interaction_id,
                    invoker,
                    "start_vote",
                    "Invalid user ID provided for voting.",
                )
            }
        };
        if !self.is_primary(guild) {
            return self.reject(interaction_id, invoker, "start_vote", WRONG_GUILD);
        }
        let Some(target) = self.roster.member(guild, &target).await else {
            return self.reject(
                interaction_id,
                invoker,
                "start_vote",
                "The user you are trying to vote on does not exist in this guild.",
            );
        };
        if !value.trim().eq_ignore_ascii_case("yes") {
            return self.reject(
                interaction_id,
                invoker,
                "start_vote",
                "You must type 'yes' to confirm starting the vote.",
            );
        }

        match self
            .governor
            .create(NewVote::new(invoker, &target, &self.config.vote))
        {
            Ok(vote) => {
                info!(
                    vote_id = %vote.id,
                    instigator = %invoker.username,
                    target = %target.username,
                    origin_channel = %channel,
                    "Vote started from confirmation"
                );
                self.outbox.notice(
                    interaction_id,
                    format!(
                        "Vote started successfully! The vote will last for {} seconds.",
                        self.config.vote.timeout.as_secs()
                    ),
                );
            }
            Err(e) => self.reject(interaction_id, invoker, "start_vote", e.user_message()),
        }
    }

    // =========================================================================
    // Ballot controls
    // =========================================================================

    async fn button(&self, interaction_id: &str, guild: &GuildId, invoker: &Member, custom_id: &str) {
        let (kind, vote) = match custom_id.parse::<ControlId>() {
            Ok(ControlId::Vote { kind, vote }) => (kind, vote),
            Ok(ControlId::ConfirmStart { .. }) => {
                return self.reject(interaction_id, invoker, "button", STALE_CONTROL)
            }
            Err(ControlIdError::Foreign(id)) => {
                debug!(custom_id = %id, "Ignoring control that is not ours");
                return;
            }
            Err(e) => {
                warn!(custom_id, "Rejected control id: {}", e);
                return self.reject(interaction_id, invoker, "button", STALE_CONTROL);
            }
        };

        if self.is_primary(guild) {
            if let Err(e) =
                sync_member(self.directory.as_ref(), self.governor.weights(), invoker).await
            {
                warn!(member = %invoker.id, "Failed to record voter in directory: {}", e);
            }
        }

        self.dispatch(interaction_id, invoker, kind, &vote);
    }

    fn dispatch(&self, interaction_id: &str, invoker: &Member, kind: ControlKind, vote: &VoteId) {
        let outcome = match kind {
            ControlKind::Cast => self
                .governor
                .cast(vote, &invoker.id, &invoker.role_ids())
                .map(|_| "Your vote has been processed."),
            ControlKind::Retract => self
                .governor
                .retract(vote, &invoker.id)
                .map(|_| "Your vote has been removed."),
            ControlKind::Cancel => self
                .governor
                .cancel(vote, &invoker.id)
                .map(|_| "The vote has been cancelled."),
        };
        match outcome {
            Ok(message) => self.outbox.notice(interaction_id, message),
            Err(e) => self.reject(interaction_id, invoker, kind.tag(), e.user_message()),
        }
    }

    // =========================================================================
    // Membership
    // =========================================================================

    async fn member_update(&self, guild: &GuildId, member: Member) {
        if self.is_primary(guild) {
            if let Err(e) =
                sync_member(self.directory.as_ref(), self.governor.weights(), &member).await
            {
                warn!(member = %member.id, "Failed to sync user: {}", e);
            }
        }
        self.roster.upsert(guild, member).await;
    }

    async fn member_remove(&self, guild: &GuildId, member: &MemberId) {
        self.roster.remove(guild, member).await;
        if self.is_primary(guild) {
            match self.directory.remove(member).await {
                Ok(true) => info!(member = %member, "Removed departed member from directory"),
                Ok(false) => {}
                Err(e) => warn!(member = %member, "Failed to remove user: {}", e),
            }
        }
    }
}

#[async_trait]
impl EventHandler for Interactions {
    async fn handle(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Command {
                interaction_id,
                guild_id,
                channel_id,
                invoker,
                command,
            } => match command {
                Command::StartVote { target } => {
                    self.start_vote(&interaction_id, &guild_id, &channel_id, &invoker, &target)
                        .await
                }
                Command::UpdateUsers { scope } => {
                    self.update_users(&interaction_id, &guild_id, &invoker, &scope)
                        .await
                }
            },
            GatewayEvent::ModalSubmit {
                interaction_id,
                guild_id,
                invoker,
                custom_id,
                value,
            } => {
                self.confirm_start(&interaction_id, &guild_id, &invoker, &custom_id, &value)
                    .await
            }
            GatewayEvent::Button {
                interaction_id,
                guild_id,
                invoker,
                custom_id,
            } => {
                self.button(&interaction_id, &guild_id, &invoker, &custom_id)
                    .await
            }
            GatewayEvent::MemberUpdate { guild_id, member } => {
                self.member_update(&guild_id, member).await
            }
            GatewayEvent::MemberRemove {
                guild_id,
                member_id,
            } => self.member_remove(&guild_id, &member_id).await,
        }
    }
}
