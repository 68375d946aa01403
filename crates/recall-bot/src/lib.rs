//! Recall Bot
//!
//! Host process for the recall vote governor. The chat platform connection
//! runs in a companion process that speaks JSON lines over stdio; this crate
//! owns everything behind it:
//!
//! - `config`: layered settings (defaults, TOML, environment, CLI)
//! - `gateway`: wire types and the read/write loops
//! - `interactions`: commands, the confirmation modal and ballot buttons
//! - `roster`: guild membership and role revocation
//! - `sink`: vote messages out to the vote channel
//! - `jobs`: user directory maintenance

pub mod app;
pub mod config;
pub mod gateway;
pub mod interactions;
pub mod jobs;
pub mod roster;
pub mod sink;

pub use app::App;
pub use config::{BotConfig, ConfigError, DirectoryBackend};
pub use gateway::{run_session, spawn_writer, GatewayEvent, GatewayMessage, Outbox};
pub use interactions::Interactions;
pub use roster::{Roster, RosterSnapshot};
