//! Wiring: builds the governor and its collaborators from a [`BotConfig`].

use std::sync::Arc;

use anyhow::{Context, Result};
use recall_governor::{
    Collaborators, EventBus, JsonFileDirectory, MemoryDirectory, Revoker, SharedEventBus,
    SharedVoteGovernor, UserDirectory, VoteGovernor,
};
use tracing::info;

use crate::config::{BotConfig, DirectoryBackend};
use crate::gateway::Outbox;
use crate::interactions::Interactions;
use crate::roster::Roster;
use crate::sink::GatewaySink;

/// A running bot minus its gateway session.
pub struct App {
    pub governor: SharedVoteGovernor,
    pub events: SharedEventBus,
    pub roster: Arc<Roster>,
    pub directory: Arc<dyn UserDirectory>,
    pub interactions: Interactions,
}

impl App {
    /// Must be called from within a Tokio runtime.
    pub async fn assemble(config: BotConfig, outbox: Outbox) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let roster = match &config.roster_path {
            Some(path) => Roster::load(path)
                .await
                .with_context(|| format!("Failed to load roster from {}", path.display()))?,
            None => Roster::new(),
        };
        roster.add_guild(&config.guild_id).await;
        let roster = Arc::new(roster.with_outbox(outbox.clone()));

        let directory: Arc<dyn UserDirectory> = match &config.directory {
            DirectoryBackend::Memory => Arc::new(MemoryDirectory::new()),
            DirectoryBackend::File(path) => Arc::new(
                JsonFileDirectory::open(path.clone())
                    .await
                    .with_context(|| format!("Failed to open user directory {}", path.display()))?,
            ),
        };

        let events = EventBus::new().shared();
        let revoker = Revoker::new(roster.clone(), config.guild_id.clone())
            .with_secondary(config.additional_guilds.clone())
            .with_mode(config.mode);
        let governor = VoteGovernor::new(
            config.governor_config(),
            Collaborators {
                sink: Arc::new(GatewaySink::new(
                    outbox.clone(),
                    config.vote_channel_id.clone(),
                )),
                directory: directory.clone(),
                revoker,
                events: events.clone(),
            },
        );

        info!(
            guild = %config.guild_id,
            secondary_guilds = config.additional_guilds.len(),
            weighted_roles = config.weights.entries().len(),
            threshold = config.vote.threshold,
            timeout_secs = config.vote.timeout.as_secs(),
            mode = %config.mode,
            "Recall bot assembled"
        );

        let interactions = Interactions::new(
            Arc::new(config),
            governor.clone(),
            roster.clone(),
            directory.clone(),
            outbox,
        );
        Ok(Self {
            governor,
            events,
            roster,
            directory,
            interactions,
        })
    }
}
