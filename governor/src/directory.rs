//! Persisted user directory
//!
//! Records, for every member who holds a weighted role, the heaviest such
//! role. The governor reads it to compose the ping list of an announcement;
//! membership sync keeps it current through [`sync_member`].
//!
//! Two backends are provided: [`MemoryDirectory`] and [`JsonFileDirectory`],
//! which rewrites a pretty-printed JSON document after every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::member::{Member, MemberId, RoleId};
use crate::weights::{Weight, WeightTable};

/// Error type for directory operations
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// One directory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub member_id: MemberId,
    pub username: String,
    /// Heaviest weighted role the member held when last synced.
    pub role_id: Option<RoleId>,
}

/// Member-id keyed store of weighted members.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list(&self) -> DirectoryResult<Vec<DirectoryEntry>>;

    async fn get(&self, member_id: &MemberId) -> DirectoryResult<Option<DirectoryEntry>>;

    async fn upsert(&self, entry: DirectoryEntry) -> DirectoryResult<()>;

    /// Returns whether an entry was removed.
    async fn remove(&self, member_id: &MemberId) -> DirectoryResult<bool>;
}

/// What [`sync_member`] did with a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Bots are never recorded.
    SkippedBot,
    /// Entry created or its role changed.
    Recorded { role_id: RoleId, weight: Weight },
    /// Entry already matched.
    Unchanged,
    /// Member lost every weighted role and was dropped.
    Removed,
    /// Member holds no weighted role and had no entry.
    Absent,
}

/// Bring a member's directory entry in line with the roles they hold.
pub async fn sync_member(
    directory: &dyn UserDirectory,
    weights: &WeightTable,
    member: &Member,
) -> DirectoryResult<SyncOutcome> {
    if member.bot {
        return Ok(SyncOutcome::SkippedBot);
    }

    let existing = directory.get(&member.id).await?;
    match weights.role_for(&member.role_ids()) {
        Some(row) => {
            let entry = DirectoryEntry {
                member_id: member.id.clone(),
                username: member.username.clone(),
                role_id: Some(row.role_id.clone()),
            };
            if existing.as_ref() == Some(&entry) {
                return Ok(SyncOutcome::Unchanged);
            }
            info!(
                member = %member.id,
                username = %member.username,
                role = %row.role_id,
                weight = row.weight,
                "Recording weighted member"
            );
            directory.upsert(entry).await?;
            Ok(SyncOutcome::Recorded {
                role_id: row.role_id.clone(),
                weight: row.weight,
            })
        }
        None if existing.is_some() => {
            directory.remove(&member.id).await?;
            info!(member = %member.id, username = %member.username, "Removed member without weighted role");
            Ok(SyncOutcome::Removed)
        }
        None => Ok(SyncOutcome::Absent),
    }
}

/// Members to mention when a vote opens: everyone recorded except the
/// instigator.
pub async fn ping_list(
    directory: &dyn UserDirectory,
    instigator: &MemberId,
) -> DirectoryResult<Vec<MemberId>> {
    Ok(directory
        .list()
        .await?
        .into_iter()
        .map(|e| e.member_id)
        .filter(|id| id != instigator)
        .collect())
}

/// In-memory directory.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: RwLock<BTreeMap<MemberId, DirectoryEntry>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn list(&self) -> DirectoryResult<Vec<DirectoryEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn get(&self, member_id: &MemberId) -> DirectoryResult<Option<DirectoryEntry>> {
        Ok(self.entries.read().await.get(member_id).cloned())
    }

    async fn upsert(&self, entry: DirectoryEntry) -> DirectoryResult<()> {
        self.entries
            .write()
            .await
            .insert(entry.member_id.clone(), entry);
        Ok(())
    }

    async fn remove(&self, member_id: &MemberId) -> DirectoryResult<bool> {
        Ok(self.entries.write().await.remove(member_id).is_some())
    }
}

/// Directory persisted as a JSON array on disk.
pub struct JsonFileDirectory {
    path: PathBuf,
    entries: RwLock<BTreeMap<MemberId, DirectoryEntry>>,
}

impl JsonFileDirectory {
    /// Open the directory at `path`, starting empty if the file is absent.
    pub async fn open(path: impl Into<PathBuf>) -> DirectoryResult<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str::<Vec<DirectoryEntry>>(&json)?
                .into_iter()
                .map(|e| (e.member_id.clone(), e))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), entries = entries.len(), "Opened user directory");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<MemberId, DirectoryEntry>) -> DirectoryResult<()> {
        let rows: Vec<&DirectoryEntry> = entries.values().collect();
        let json = serde_json::to_string_pretty(&rows)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = rows.len(), "Directory persisted");
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for JsonFileDirectory {
    async fn list(&self) -> DirectoryResult<Vec<DirectoryEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn get(&self, member_id: &MemberId) -> DirectoryResult<Option<DirectoryEntry>> {
        Ok(self.entries.read().await.get(member_id).cloned())
    }

    async fn upsert(&self, entry: DirectoryEntry) -> DirectoryResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.member_id.clone(), entry);
        self.persist(&entries).await
    }

    async fn remove(&self, member_id: &MemberId) -> DirectoryResult<bool> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(member_id).is_some();
        if removed {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::RoleDescriptor;
    use crate::weights::RoleWeight;

    fn weights() -> WeightTable {
        WeightTable::new(vec![RoleWeight::new("mod", 3), RoleWeight::new("member", 1)])
    }

    #[tokio::test]
    async fn test_sync_records_heaviest_role() {
        let directory = MemoryDirectory::new();
        let member = Member::new("7", "carol")
            .with_role(RoleDescriptor::new("member", "Member"))
            .with_role(RoleDescriptor::new("mod", "Moderator"));

        let outcome = sync_member(&directory, &weights(), &member).await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Recorded {
                role_id: RoleId::new("mod"),
                weight: 3
            }
        );
        let again = sync_member(&directory, &weights(), &member).await.unwrap();
        assert_eq!(again, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_sync_removes_member_who_lost_roles() {
        let directory = MemoryDirectory::new();
        let member = Member::new("7", "carol").with_role(RoleDescriptor::new("member", "Member"));
        sync_member(&directory, &weights(), &member).await.unwrap();

        let demoted = Member::new("7", "carol");
        assert_eq!(
            sync_member(&directory, &weights(), &demoted).await.unwrap(),
            SyncOutcome::Removed
        );
        assert!(directory.list().await.unwrap().is_empty());
        assert_eq!(
            sync_member(&directory, &weights(), &demoted).await.unwrap(),
            SyncOutcome::Absent
        );
    }

    #[tokio::test]
    async fn test_sync_skips_bots() {
        let directory = MemoryDirectory::new();
        let mut bot = Member::new("9", "helper-bot").with_role(RoleDescriptor::new("mod", "Moderator"));
        bot.bot = true;
        assert_eq!(
            sync_member(&directory, &weights(), &bot).await.unwrap(),
            SyncOutcome::SkippedBot
        );
        assert!(directory.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ping_list_excludes_instigator() {
        let directory = MemoryDirectory::new();
        for id in ["1", "2", "3"] {
            directory
                .upsert(DirectoryEntry {
                    member_id: MemberId::new(id),
                    username: format!("user{id}"),
                    role_id: Some(RoleId::new("member")),
                })
                .await
                .unwrap();
        }
        let pings = ping_list(&directory, &MemberId::new("2")).await.unwrap();
        assert_eq!(pings, vec![MemberId::new("1"), MemberId::new("3")]);
    }

    #[tokio::test]
    async fn test_json_directory_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let directory = JsonFileDirectory::open(&path).await.unwrap();
        directory
            .upsert(DirectoryEntry {
                member_id: MemberId::new("1"),
                username: "alice".into(),
                role_id: Some(RoleId::new("mod")),
            })
            .await
            .unwrap();
        directory
            .upsert(DirectoryEntry {
                member_id: MemberId::new("2"),
                username: "bob".into(),
                role_id: None,
            })
            .await
            .unwrap();
        assert!(directory.remove(&MemberId::new("2")).await.unwrap());
        assert!(!directory.remove(&MemberId::new("2")).await.unwrap());

        let reopened = JsonFileDirectory::open(&path).await.unwrap();
        let entries = reopened.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username, "alice");
    }

    #[tokio::test]
    async fn test_json_directory_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonFileDirectory::open(&path).await,
            Err(DirectoryError::Serialization(_))
        ));
    }
}
