//! Recall bot
//!
//! Reads gateway events from stdin and writes gateway messages to stdout.
//! Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! GUILD_ID=123 VOTE_CHANNEL_ID=456 ROLE_WEIGHTS=mod:3,member:1 recall-bot
//!
//! # With a config file and a roster snapshot
//! recall-bot --config recall.toml --roster roster.json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use recall_bot::{run_session, spawn_writer, App, BotConfig, DirectoryBackend, Outbox};
use recall_governor::RunMode;
use tokio::io::BufReader;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (environment variables override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Guild roster snapshot (overrides RECALL_ROSTER)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// User directory file, or :memory: (overrides DATABASE_CONNECTION_STRING)
    #[arg(long)]
    directory: Option<String>,

    /// Weighted votes required to pass (overrides REQUIRED_VOTES)
    #[arg(long)]
    required_votes: Option<u32>,

    /// Vote duration in seconds (overrides VOTE_TIMEOUT)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Run mode: production, development or test (overrides NODE_ENV)
    #[arg(long)]
    mode: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut BotConfig) {
        if let Some(roster) = &self.roster {
            config.roster_path = Some(roster.clone());
        }
        if let Some(directory) = &self.directory {
            config.directory = DirectoryBackend::from_connection_string(directory);
        }
        if let Some(threshold) = self.required_votes {
            config.vote.threshold = threshold;
        }
        if let Some(secs) = self.timeout_secs {
            config.vote.timeout = Duration::from_secs(secs);
        }
        if let Some(mode) = &self.mode {
            config.mode = RunMode::from_env_value(mode);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = BotConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let (outbox, rx) = Outbox::channel();
    let writer = spawn_writer(rx, tokio::io::stdout());
    let app = App::assemble(config, outbox).await?;

    info!("Recall bot listening on stdin");
    let stats = run_session(BufReader::new(tokio::io::stdin()), &app.interactions).await?;
    info!(
        lines = stats.lines,
        dispatched = stats.dispatched,
        malformed = stats.malformed,
        "Gateway input closed"
    );

    // Let queued renders and revocations land before the outbox closes.
    app.governor.flush().await;
    drop(app);
    let written = writer.await??;
    info!(written, "Recall bot stopped");

    Ok(())
}
