//! Bot configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The binary applies command-line overrides last and
//! calls [`BotConfig::validate`] before anything starts.
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `GUILD_ID` | Primary guild |
//! | `VOTE_CHANNEL_ID` | Channel vote messages are posted to |
//! | `ADDITIONAL_GUILDS` | Comma list of guilds revocation replicates to |
//! | `ALLOWED_ROLES` | Comma list of roles allowed to start a vote (empty: anyone) |
//! | `ROLE_WEIGHTS` | `role:weight,role:weight` |
//! | `REQUIRED_VOTES` | Weighted threshold |
//! | `VOTE_TIMEOUT` | Vote duration in milliseconds |
//! | `RECALL_TICK_SECS` | Re-evaluation period |
//! | `DATABASE_CONNECTION_STRING` | User directory file, or `:memory:` |
//! | `RECALL_ROSTER` | Guild roster snapshot (JSON) |
//! | `NODE_ENV` | `development`/`dev`, `test`, or production |

use std::path::{Path, PathBuf};
use std::time::Duration;

use recall_governor::settings::VoteSettings;
use recall_governor::{
    GovernorConfig, GuildId, RoleId, RunMode, Weight, WeightTable, WeightTableError,
};
use serde::Deserialize;

/// Directory connection string meaning "keep it in memory".
pub const IN_MEMORY_DIRECTORY: &str = ":memory:";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid role weights: {0}")]
    Weights(#[from] WeightTableError),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Result type alias for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where the user directory lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryBackend {
    Memory,
    File(PathBuf),
}

impl DirectoryBackend {
    pub fn from_connection_string(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == IN_MEMORY_DIRECTORY {
            Self::Memory
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

/// Config file layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    guild_id: Option<String>,
    vote_channel_id: Option<String>,
    additional_guilds: Option<Vec<String>>,
    allowed_roles: Option<Vec<String>>,
    role_weights: Option<WeightTable>,
    required_votes: Option<Weight>,
    vote_timeout_secs: Option<u64>,
    tick_secs: Option<u64>,
    mode: Option<RunMode>,
    directory: Option<String>,
    roster: Option<PathBuf>,
}

/// Resolved bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub guild_id: GuildId,
    pub vote_channel_id: String,
    pub additional_guilds: Vec<GuildId>,
    /// Roles allowed to start a vote; empty means anyone.
    pub allowed_roles: Vec<RoleId>,
    pub weights: WeightTable,
    pub vote: VoteSettings,
    pub mode: RunMode,
    pub directory: DirectoryBackend,
    pub roster_path: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            guild_id: GuildId::new(""),
            vote_channel_id: String::new(),
            additional_guilds: Vec::new(),
            allowed_roles: Vec::new(),
            weights: WeightTable::default(),
            vote: VoteSettings::default(),
            mode: RunMode::Production,
            directory: DirectoryBackend::Memory,
            roster_path: None,
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

impl BotConfig {
    /// Defaults, then `path` (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.apply_file(path)?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_file(&mut self, path: &Path) -> ConfigResult<()> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply_toml(&raw)
    }

    pub fn apply_toml(&mut self, raw: &str) -> ConfigResult<()> {
        let file: FileConfig = toml::from_str(raw)?;

        if let Some(guild) = file.guild_id {
            self.guild_id = GuildId::new(guild);
        }
        if let Some(channel) = file.vote_channel_id {
            self.vote_channel_id = channel;
        }
        if let Some(guilds) = file.additional_guilds {
            self.additional_guilds = guilds.into_iter().map(GuildId::new).collect();
        }
        if let Some(roles) = file.allowed_roles {
            self.allowed_roles = roles.into_iter().map(RoleId::new).collect();
        }
        if let Some(weights) = file.role_weights {
            self.weights = weights;
        }
        if let Some(threshold) = file.required_votes {
            self.vote.threshold = threshold;
        }
        if let Some(secs) = file.vote_timeout_secs {
            self.vote.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.tick_secs {
            self.vote.tick_period = Duration::from_secs(secs);
        }
        if let Some(mode) = file.mode {
            self.mode = mode;
        }
        if let Some(directory) = file.directory {
            self.directory = DirectoryBackend::from_connection_string(&directory);
        }
        if let Some(roster) = file.roster {
            self.roster_path = Some(roster);
        }
        Ok(())
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(guild) = lookup("GUILD_ID") {
            self.guild_id = GuildId::new(guild.trim());
        }
        if let Some(channel) = lookup("VOTE_CHANNEL_ID") {
            self.vote_channel_id = channel.trim().to_string();
        }
        if let Some(guilds) = lookup("ADDITIONAL_GUILDS") {
            self.additional_guilds = split_list(&guilds).map(GuildId::new).collect();
        }
        if let Some(roles) = lookup("ALLOWED_ROLES") {
            self.allowed_roles = split_list(&roles).map(RoleId::new).collect();
        }
        if let Some(weights) = lookup("ROLE_WEIGHTS") {
            self.weights = WeightTable::parse(&weights)?;
        }
        if let Some(threshold) = lookup("REQUIRED_VOTES") {
            self.vote.threshold = parse_number("REQUIRED_VOTES", &threshold)?;
        }
        if let Some(millis) = lookup("VOTE_TIMEOUT") {
            self.vote.timeout = Duration::from_millis(parse_number("VOTE_TIMEOUT", &millis)?);
        }
        if let Some(secs) = lookup("RECALL_TICK_SECS") {
            self.vote.tick_period = Duration::from_secs(parse_number("RECALL_TICK_SECS", &secs)?);
        }
        if let Some(directory) = lookup("DATABASE_CONNECTION_STRING") {
            self.directory = DirectoryBackend::from_connection_string(&directory);
        }
        if let Some(roster) = lookup("RECALL_ROSTER") {
            self.roster_path = Some(PathBuf::from(roster));
        }
        if let Some(env) = lookup("NODE_ENV") {
            self.mode = RunMode::from_env_value(&env);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.guild_id.as_str().is_empty() {
            return Err(ConfigError::Missing("GUILD_ID"));
        }
        if self.vote_channel_id.is_empty() {
            return Err(ConfigError::Missing("VOTE_CHANNEL_ID"));
        }
        if self.weights.is_empty() {
            return Err(ConfigError::Missing("ROLE_WEIGHTS"));
        }
        if self.vote.threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "REQUIRED_VOTES",
                value: "0".into(),
            });
        }
        if self.vote.tick_period.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "RECALL_TICK_SECS",
                value: "0".into(),
            });
        }
        Ok(())
    }

    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig::new(self.weights.clone(), &self.vote, self.mode)
    }

    /// Whether a member holding `roles` may start a vote.
    pub fn may_start_vote(&self, roles: &[RoleId]) -> bool {
        self.allowed_roles.is_empty() || roles.iter().any(|r| self.allowed_roles.contains(r))
    }
}
