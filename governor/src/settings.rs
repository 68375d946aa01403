//! Vote settings and run mode

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::weights::Weight;

/// Process run mode.
///
/// Development mode suppresses revocation; development and test modes add a
/// banner to every rendered vote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Production,
    Development,
    Test,
}

impl RunMode {
    /// Interpret a `NODE_ENV`-style value. Unknown values mean production.
    pub fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            "test" => Self::Test,
            _ => Self::Production,
        }
    }

    pub fn revocation_enabled(self) -> bool {
        !matches!(self, Self::Development)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Default vote duration (30 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default scheduler period (1 minute).
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(60);

/// Numeric settings applied to each new vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteSettings {
    /// Weighted sum required to pass.
    pub threshold: Weight,
    /// Time from creation to expiry.
    pub timeout: Duration,
    /// How often the scheduler re-evaluates the active vote.
    pub tick_period: Duration,
}

impl Default for VoteSettings {
    fn default() -> Self {
        Self {
            threshold: 1,
            timeout: DEFAULT_TIMEOUT,
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }
}
