//! Privilege revocation
//!
//! When a vote passes, the target's roles are cleared in the primary guild
//! and then in every configured secondary guild. Each guild is attempted
//! independently; a failure is logged and reported, never propagated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::member::{GuildId, MemberId, RoleId};
use crate::settings::RunMode;

/// Error type for role administration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevocationError {
    #[error("Guild {0} is unavailable")]
    GuildUnavailable(GuildId),

    #[error("Member {member} not found in guild {guild}")]
    MemberNotFound { guild: GuildId, member: MemberId },

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Guild {guild} did not answer within {timeout:?}")]
    TimedOut { guild: GuildId, timeout: Duration },
}

/// Upper bound on a single guild's `clear_roles` call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Platform seam for role administration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberAdmin: Send + Sync {
    /// Strip every removable role `member` holds in `guild`; returns the
    /// roles that were removed.
    async fn clear_roles(
        &self,
        guild: &GuildId,
        member: &MemberId,
    ) -> Result<Vec<RoleId>, RevocationError>;
}

/// Outcome for one guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildOutcome {
    pub guild: GuildId,
    pub result: Result<Vec<RoleId>, RevocationError>,
}

/// Per-guild results of one revocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationReport {
    /// Set when the run mode suppressed revocation.
    pub skipped: bool,
    pub outcomes: Vec<GuildOutcome>,
}

impl RevocationReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

/// Clears a target's roles across the primary and secondary guilds.
#[derive(Clone)]
pub struct Revoker {
    admin: Arc<dyn MemberAdmin>,
    primary: GuildId,
    secondary: Vec<GuildId>,
    mode: RunMode,
    call_timeout: Duration,
}

impl Revoker {
    pub fn new(admin: Arc<dyn MemberAdmin>, primary: GuildId) -> Self {
        Self {
            admin,
            primary,
            secondary: Vec::new(),
            mode: RunMode::Production,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_secondary(mut self, guilds: Vec<GuildId>) -> Self {
        self.secondary = guilds;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub async fn revoke(&self, target: &MemberId) -> RevocationReport {
        if !self.mode.revocation_enabled() {
            info!(target = %target, mode = %self.mode, "Role removal disabled in this run mode");
            return RevocationReport {
                skipped: true,
                outcomes: Vec::new(),
            };
        }

        let mut outcomes = Vec::with_capacity(1 + self.secondary.len());
        for guild in std::iter::once(&self.primary).chain(self.secondary.iter()) {
            let result =
                match tokio::time::timeout(self.call_timeout, self.admin.clear_roles(guild, target))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RevocationError::TimedOut {
                        guild: guild.clone(),
                        timeout: self.call_timeout,
                    }),
                };
            match &result {
                Ok(roles) => info!(
                    guild = %guild,
                    target = %target,
                    removed = roles.len(),
                    "Removed roles"
                ),
                Err(e) if guild == &self.primary => {
                    error!(guild = %guild, target = %target, "Failed to remove roles in primary guild: {}", e)
                }
                Err(e) => {
                    warn!(guild = %guild, target = %target, "Failed to remove roles in secondary guild: {}", e)
                }
            }
            outcomes.push(GuildOutcome {
                guild: guild.clone(),
                result,
            });
        }

        RevocationReport {
            skipped: false,
            outcomes,
        }
    }
}
