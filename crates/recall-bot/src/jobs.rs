//! Directory maintenance jobs
//!
//! `update_users` re-syncs the user directory from the roster: a single
//! member, every member of the primary guild, or every member already
//! recorded. Failures on individual members are logged and counted; the job
//! always runs to the end.

use std::fmt;

use recall_governor::directory::sync_member;
use recall_governor::{GuildId, Member, MemberId, SyncOutcome, UserDirectory, WeightTable};
use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::UpdateScope;
use crate::roster::Roster;

/// Tally of one maintenance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub scanned: usize,
    pub recorded: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncSummary {
    fn record(&mut self, outcome: &SyncOutcome) {
        self.scanned += 1;
        match outcome {
            SyncOutcome::Recorded { .. } => self.recorded += 1,
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Removed => self.removed += 1,
            SyncOutcome::SkippedBot | SyncOutcome::Absent => self.skipped += 1,
        }
    }

    fn fail(&mut self) {
        self.scanned += 1;
        self.failed += 1;
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Checked {} users: {} recorded, {} unchanged, {} removed, {} skipped, {} failed.",
            self.scanned, self.recorded, self.unchanged, self.removed, self.skipped, self.failed
        )
    }
}

/// Shared inputs for the maintenance jobs.
pub struct UserSync<'a> {
    pub directory: &'a dyn UserDirectory,
    pub weights: &'a WeightTable,
    pub roster: &'a Roster,
    pub guild: &'a GuildId,
}

impl UserSync<'_> {
    async fn sync(&self, member: &Member, summary: &mut SyncSummary) {
        match sync_member(self.directory, self.weights, member).await {
            Ok(outcome) => summary.record(&outcome),
            Err(e) => {
                warn!(member = %member.id, "Failed to sync user: {}", e);
                summary.fail();
            }
        }
    }

    /// Run `scope` on behalf of `invoker`.
    pub async fn update_users(&self, scope: &UpdateScope, invoker: &Member) -> SyncSummary {
        let summary = match scope {
            UpdateScope::User(target) => self.update_user(target.as_ref(), invoker).await,
            UpdateScope::All => self.update_all().await,
            UpdateScope::Existing => self.update_existing().await,
        };
        info!(scope = ?scope, summary = %summary, "User update finished");
        summary
    }

    /// The invoker is always refreshed along with `target`.
    async fn update_user(&self, target: Option<&MemberId>, invoker: &Member) -> SyncSummary {
        let mut summary = SyncSummary::default();
        if let Some(target) = target.filter(|t| *t != &invoker.id) {
            match self.roster.member(self.guild, target).await {
                Some(member) => self.sync(&member, &mut summary).await,
                None => {
                    warn!(member = %target, "Could not find user in guild");
                    summary.fail();
                }
            }
        }
        let current = self
            .roster
            .member(self.guild, &invoker.id)
            .await
            .unwrap_or_else(|| invoker.clone());
        self.sync(&current, &mut summary).await;
        summary
    }

    async fn update_all(&self) -> SyncSummary {
        for row in self.weights.entries() {
            if !self.roster.role_in_use(self.guild, &row.role_id).await {
                warn!(guild = %self.guild, role = %row.role_id, "Weighted role not found in guild");
            }
        }

        let mut summary = SyncSummary::default();
        for member in self.roster.members(self.guild).await {
            self.sync(&member, &mut summary).await;
        }
        summary
    }

    async fn update_existing(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();
        let entries = match self.directory.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list directory: {}", e);
                summary.fail();
                return summary;
            }
        };

        for entry in entries {
            match self.roster.member(self.guild, &entry.member_id).await {
                Some(member) => self.sync(&member, &mut summary).await,
                // left the guild
                None => match self.directory.remove(&entry.member_id).await {
                    Ok(_) => summary.record(&SyncOutcome::Removed),
                    Err(e) => {
                        warn!(member = %entry.member_id, "Failed to remove user: {}", e);
                        summary.fail();
                    }
                },
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_governor::{DirectoryEntry, MemoryDirectory, RoleDescriptor, RoleId, RoleWeight};

    fn weights() -> WeightTable {
        WeightTable::new(vec![RoleWeight::new("mod", 2), RoleWeight::new("member", 1)])
    }

    async fn roster() -> Roster {
        let roster = Roster::new();
        let guild = GuildId::new("g");
        roster
            .upsert(
                &guild,
                Member::new("1", "alice").with_role(RoleDescriptor::new("mod", "Moderator")),
            )
            .await;
        roster
            .upsert(
                &guild,
                Member::new("2", "bob").with_role(RoleDescriptor::new("member", "Member")),
            )
            .await;
        roster.upsert(&guild, Member::new("3", "carol")).await;
        roster
    }

    #[tokio::test]
    async fn test_update_all_records_weighted_members() {
        let directory = MemoryDirectory::new();
        let roster = roster().await;
        let guild = GuildId::new("g");
        let job = UserSync {
            directory: &directory,
            weights: &weights(),
            roster: &roster,
            guild: &guild,
        };

        let summary = job
            .update_users(&UpdateScope::All, &Member::new("1", "alice"))
            .await;
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.recorded, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(directory.list().await.unwrap().len(), 2);

        let again = job
            .update_users(&UpdateScope::All, &Member::new("1", "alice"))
            .await;
        assert_eq!(again.unchanged, 2);
    }

    #[tokio::test]
    async fn test_update_existing_drops_departed_members() {
        let directory = MemoryDirectory::new();
        directory
            .upsert(DirectoryEntry {
                member_id: MemberId::new("9"),
                username: "gone".into(),
                role_id: Some(RoleId::new("member")),
            })
            .await
            .unwrap();
        let roster = roster().await;
        let guild = GuildId::new("g");
        let job = UserSync {
            directory: &directory,
            weights: &weights(),
            roster: &roster,
            guild: &guild,
        };

        let summary = job
            .update_users(&UpdateScope::Existing, &Member::new("1", "alice"))
            .await;
        assert_eq!(summary.removed, 1);
        assert!(directory.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_user_includes_invoker() {
        let directory = MemoryDirectory::new();
        let roster = roster().await;
        let guild = GuildId::new("g");
        let job = UserSync {
            directory: &directory,
            weights: &weights(),
            roster: &roster,
            guild: &guild,
        };

        let summary = job
            .update_users(
                &UpdateScope::User(Some(MemberId::new("2"))),
                &Member::new("1", "alice"),
            )
            .await;
        assert_eq!(summary.recorded, 2);

        let missing = job
            .update_users(
                &UpdateScope::User(Some(MemberId::new("404"))),
                &Member::new("1", "alice"),
            )
            .await;
        assert_eq!(missing.failed, 1);
        assert_eq!(missing.unchanged, 1);
    }
}
