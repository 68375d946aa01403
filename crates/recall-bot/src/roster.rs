//! Guild roster
//!
//! The bot's view of guild membership: seeded from a JSON snapshot at start
//! and kept current by `member_update` / `member_remove` gateway events.
//! It also performs role revocation ([`MemberAdmin`]); clearing a member's
//! roles updates the roster and tells the host through a
//! [`GatewayMessage::RolesCleared`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use recall_governor::{GuildId, Member, MemberAdmin, MemberId, RevocationError, RoleId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayMessage, Outbox};

/// Error type for roster loading
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid roster snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// On-disk roster layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub guilds: BTreeMap<GuildId, Vec<Member>>,
}

/// In-memory guild membership.
#[derive(Default)]
pub struct Roster {
    guilds: RwLock<HashMap<GuildId, BTreeMap<MemberId, Member>>>,
    outbox: Option<Outbox>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RosterSnapshot) -> Self {
        let guilds = snapshot
            .guilds
            .into_iter()
            .map(|(guild, members)| {
                let members = members.into_iter().map(|m| (m.id.clone(), m)).collect();
                (guild, members)
            })
            .collect();
        Self {
            guilds: RwLock::new(guilds),
            outbox: None,
        }
    }

    pub async fn load(path: &Path) -> Result<Self, RosterError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: RosterSnapshot = serde_json::from_str(&raw)?;
        let members: usize = snapshot.guilds.values().map(Vec::len).sum();
        info!(
            path = %path.display(),
            guilds = snapshot.guilds.len(),
            members,
            "Loaded guild roster"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Report cleared roles to the host through `outbox`.
    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub async fn add_guild(&self, guild: &GuildId) {
        self.guilds.write().await.entry(guild.clone()).or_default();
    }

    pub async fn member(&self, guild: &GuildId, member: &MemberId) -> Option<Member> {
        self.guilds.read().await.get(guild)?.get(member).cloned()
    }

    pub async fn members(&self, guild: &GuildId) -> Vec<Member> {
        self.guilds
            .read()
            .await
            .get(guild)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether anyone in `guild` holds `role`.
    pub async fn role_in_use(&self, guild: &GuildId, role: &RoleId) -> bool {
        self.guilds
            .read()
            .await
            .get(guild)
            .is_some_and(|members| {
                members
                    .values()
                    .any(|m| m.roles.iter().any(|r| &r.id == role))
            })
    }

    pub async fn upsert(&self, guild: &GuildId, member: Member) {
        debug!(guild = %guild, member = %member.id, roles = member.roles.len(), "Roster update");
        self.guilds
            .write()
            .await
            .entry(guild.clone())
            .or_default()
            .insert(member.id.clone(), member);
    }

    pub async fn remove(&self, guild: &GuildId, member: &MemberId) -> Option<Member> {
        self.guilds.write().await.get_mut(guild)?.remove(member)
    }
}

#[async_trait]
impl MemberAdmin for Roster {
    async fn clear_roles(
        &self,
        guild: &GuildId,
        member: &MemberId,
    ) -> Result<Vec<RoleId>, RevocationError> {
        let removed = {
            let mut guilds = self.guilds.write().await;
            let members = guilds
                .get_mut(guild)
                .ok_or_else(|| RevocationError::GuildUnavailable(guild.clone()))?;
            let record = members
                .get_mut(member)
                .ok_or_else(|| RevocationError::MemberNotFound {
                    guild: guild.clone(),
                    member: member.clone(),
                })?;

            let (removed, kept): (Vec<_>, Vec<_>) =
                record.roles.drain(..).partition(|r| r.is_removable());
            record.roles = kept;
            removed.into_iter().map(|r| r.id).collect::<Vec<_>>()
        };

        if let Some(outbox) = &self.outbox {
            let message = GatewayMessage::RolesCleared {
                guild_id: guild.clone(),
                member_id: member.clone(),
                roles: removed.clone(),
            };
            if outbox.send(message).is_err() {
                warn!(guild = %guild, member = %member, "Roles cleared locally but the host was not told");
                return Err(RevocationError::Platform("gateway outbox is closed".into()));
            }
        }
        Ok(removed)
    }
}
