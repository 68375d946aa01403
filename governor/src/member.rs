//! Community identities: members, roles and guilds as the governor sees them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Platform identifier of a community member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Inline mention markup for this member.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform identifier of a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform identifier of a guild (community).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(String);

impl GuildId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the implicit role every member holds.
pub const EVERYONE_ROLE: &str = "@everyone";

/// A role as held by a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub id: RoleId,
    pub name: String,
    /// Managed roles belong to integrations and cannot be removed by hand.
    #[serde(default)]
    pub managed: bool,
}

impl RoleDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: RoleId::new(id),
            name: name.into(),
            managed: false,
        }
    }

    /// Whether revocation can strip this role.
    pub fn is_removable(&self) -> bool {
        !self.managed && self.name != EVERYONE_ROLE
    }
}

impl fmt::Display for RoleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Member identity plus display name, as recorded on a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub id: MemberId,
    pub username: String,
}

/// A guild member record resolved from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<RoleDescriptor>,
    #[serde(default)]
    pub bot: bool,
}

impl Member {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: MemberId::new(id),
            username: username.into(),
            roles: Vec::new(),
            bot: false,
        }
    }

    pub fn with_role(mut self, role: RoleDescriptor) -> Self {
        self.roles.push(role);
        self
    }

    pub fn role_ids(&self) -> Vec<RoleId> {
        self.roles.iter().map(|r| r.id.clone()).collect()
    }

    /// Roles revocation would strip, in the order the member holds them.
    pub fn removable_roles(&self) -> Vec<RoleDescriptor> {
        self.roles
            .iter()
            .filter(|r| r.is_removable())
            .cloned()
            .collect()
    }

    pub fn to_ref(&self) -> MemberRef {
        MemberRef {
            id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removable_roles_skip_managed_and_everyone() {
        let mut managed = RoleDescriptor::new("3", "Bot Integration");
        managed.managed = true;
        let member = Member::new("42", "alice")
            .with_role(RoleDescriptor::new("1", EVERYONE_ROLE))
            .with_role(RoleDescriptor::new("2", "Moderator"))
            .with_role(managed);

        let removable = member.removable_roles();
        assert_eq!(removable.len(), 1);
        assert_eq!(removable[0].to_string(), "Moderator (2)");
    }

    #[test]
    fn test_mention_markup() {
        assert_eq!(MemberId::new("123").mention(), "<@123>");
    }
}
