//! Role weight table
//!
//! Maps role identifiers to ballot weights. The table is kept sorted from the
//! heaviest role to the lightest so a lookup returns the highest-weight role a
//! member holds; weights of several held roles are never summed.

use std::num::ParseIntError;

use serde::{Deserialize, Serialize};

use crate::member::RoleId;

/// Numeric influence of one ballot.
pub type Weight = u32;

/// One row of the weight table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleWeight {
    pub role_id: RoleId,
    pub weight: Weight,
}

impl RoleWeight {
    pub fn new(role_id: impl Into<String>, weight: Weight) -> Self {
        Self {
            role_id: RoleId::new(role_id),
            weight,
        }
    }
}

/// Error type for weight table parsing
#[derive(Debug, thiserror::Error)]
pub enum WeightTableError {
    #[error("Entry '{0}' is missing the ':' separator")]
    MissingSeparator(String),

    #[error("Entry '{0}' has an empty role id")]
    EmptyRole(String),

    #[error("Entry '{entry}' has an invalid weight: {source}")]
    InvalidWeight {
        entry: String,
        #[source]
        source: ParseIntError,
    },
}

/// Ordered role → weight table, heaviest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RoleWeight>", into = "Vec<RoleWeight>")]
pub struct WeightTable {
    entries: Vec<RoleWeight>,
}

impl WeightTable {
    /// Build a table; entries are sorted descending by weight; ties keep
    /// their input order.
    pub fn new(mut entries: Vec<RoleWeight>) -> Self {
        entries.sort_by(|a, b| b.weight.cmp(&a.weight));
        Self { entries }
    }

    /// Parse the `role:weight,role:weight` form used in the environment.
    pub fn parse(spec: &str) -> Result<Self, WeightTableError> {
        let mut entries = Vec::new();
        for raw in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (role, weight) = raw
                .split_once(':')
                .ok_or_else(|| WeightTableError::MissingSeparator(raw.to_string()))?;
            let role = role.trim();
            if role.is_empty() {
                return Err(WeightTableError::EmptyRole(raw.to_string()));
            }
            let weight = weight
                .trim()
                .parse::<Weight>()
                .map_err(|source| WeightTableError::InvalidWeight {
                    entry: raw.to_string(),
                    source,
                })?;
            entries.push(RoleWeight::new(role, weight));
        }
        Ok(Self::new(entries))
    }

    /// The heaviest table row among the roles a member holds.
    pub fn role_for(&self, held: &[RoleId]) -> Option<&RoleWeight> {
        self.entries.iter().find(|e| held.contains(&e.role_id))
    }

    /// Ballot weight for a member holding `held`, or `None` if ineligible.
    pub fn weight_of(&self, held: &[RoleId]) -> Option<Weight> {
        self.role_for(held).map(|e| e.weight)
    }

    pub fn entries(&self) -> &[RoleWeight] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<RoleWeight>> for WeightTable {
    fn from(entries: Vec<RoleWeight>) -> Self {
        Self::new(entries)
    }
}

impl From<WeightTable> for Vec<RoleWeight> {
    fn from(table: WeightTable) -> Self {
        table.entries
    }
}
