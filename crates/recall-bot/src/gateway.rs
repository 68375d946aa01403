//! JSON-lines gateway
//!
//! The chat platform connection lives in a separate host process. It talks to
//! this bot over a pair of byte streams, one JSON document per line:
//! [`GatewayEvent`]s come in, [`GatewayMessage`]s go out. Lines that fail to
//! parse are logged and skipped; the session ends at end of input.
//!
//! Outbound traffic is funnelled through an [`Outbox`] so that interaction
//! handlers, the vote sink and the roster can all write without sharing the
//! writer.

use async_trait::async_trait;
use recall_governor::{GuildId, Member, MemberId, RoleId, VotePayload};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Error type for gateway I/O
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Gateway outbox is closed")]
    Closed,
}

/// Scope of an `update_users` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateScope {
    /// One member (or only the invoker when `None`).
    User(Option<MemberId>),
    /// Every member of the primary guild.
    All,
    /// Every member already in the directory.
    Existing,
}

/// Slash commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    StartVote { target: MemberId },
    UpdateUsers { scope: UpdateScope },
}

/// Inbound events from the platform host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    Command {
        interaction_id: String,
        guild_id: GuildId,
        channel_id: String,
        invoker: Member,
        command: Command,
    },
    ModalSubmit {
        interaction_id: String,
        guild_id: GuildId,
        invoker: Member,
        custom_id: String,
        /// Text typed into the confirmation field.
        value: String,
    },
    Button {
        interaction_id: String,
        guild_id: GuildId,
        invoker: Member,
        custom_id: String,
    },
    MemberUpdate {
        guild_id: GuildId,
        member: Member,
    },
    MemberRemove {
        guild_id: GuildId,
        member_id: MemberId,
    },
}

impl GatewayEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::ModalSubmit { .. } => "modal_submit",
            Self::Button { .. } => "button",
            Self::MemberUpdate { .. } => "member_update",
            Self::MemberRemove { .. } => "member_remove",
        }
    }
}

/// Text input shown inside a modal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalInput {
    pub custom_id: String,
    pub label: String,
    pub placeholder: String,
    pub min_length: u16,
    pub required: bool,
}

/// Outbound messages to the platform host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayMessage {
    Reply {
        interaction_id: String,
        content: String,
        /// Only visible to the member who triggered the interaction.
        ephemeral: bool,
    },
    ShowModal {
        interaction_id: String,
        custom_id: String,
        title: String,
        input: ModalInput,
    },
    /// Post (announce) or edit (update) the vote message.
    VoteMessage {
        channel_id: String,
        payload: VotePayload,
    },
    RolesCleared {
        guild_id: GuildId,
        member_id: MemberId,
        roles: Vec<RoleId>,
    },
}

/// Cloneable handle for queueing outbound messages.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<GatewayMessage>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: GatewayMessage) -> Result<(), GatewayError> {
        self.tx.send(message).map_err(|_| GatewayError::Closed)
    }

    /// Private notice to the member behind `interaction_id`.
    pub fn notice(&self, interaction_id: &str, content: impl Into<String>) {
        let message = GatewayMessage::Reply {
            interaction_id: interaction_id.to_string(),
            content: content.into(),
            ephemeral: true,
        };
        if self.send(message).is_err() {
            warn!(interaction_id, "Dropping reply: gateway outbox is closed");
        }
    }
}

/// Serialize queued messages to `writer` until every [`Outbox`] is dropped.
/// Resolves to the number of lines written.
pub fn spawn_writer<W>(
    mut rx: mpsc::UnboundedReceiver<GatewayMessage>,
    mut writer: W,
) -> JoinHandle<Result<u64, GatewayError>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(message) = rx.recv().await {
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.flush().await?;
            written += 1;
        }
        debug!(written, "Gateway writer stopped");
        Ok(written)
    })
}

/// Consumer of inbound events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: GatewayEvent);
}

/// Counters for one gateway session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines: u64,
    pub dispatched: u64,
    pub malformed: u64,
}

/// Read events from `reader` and dispatch them in order until end of input.
pub async fn run_session<R>(
    reader: R,
    handler: &dyn EventHandler,
) -> Result<SessionStats, GatewayError>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = SessionStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;
        match serde_json::from_str::<GatewayEvent>(&line) {
            Ok(event) => {
                debug!(event_type = event.event_type(), "Gateway event");
                handler.handle(event).await;
                stats.dispatched += 1;
            }
            Err(e) => {
                warn!(line = stats.lines, "Skipping malformed gateway event: {}", e);
                stats.malformed += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<GatewayEvent>>,
    }

    #[async_trait]
    impl EventHandler for Collect {
        async fn handle(&self, event: GatewayEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_event_wire_format() {
        let raw = r#"{"event":"command","interaction_id":"i1","guild_id":"g","channel_id":"c",
            "invoker":{"id":"1","username":"alice"},
            "command":{"name":"update_users","scope":{"user":null}}}"#;
        let event: GatewayEvent = serde_json::from_str(raw).unwrap();
        match event {
            GatewayEvent::Command { command, invoker, .. } => {
                assert_eq!(invoker.id, MemberId::new("1"));
                assert!(invoker.roles.is_empty());
                assert_eq!(
                    command,
                    Command::UpdateUsers {
                        scope: UpdateScope::User(None)
                    }
                );
            }
            other => panic!("unexpected event {other:?}"),
        }

        let scope: UpdateScope = serde_json::from_str(r#""existing""#).unwrap();
        assert_eq!(scope, UpdateScope::Existing);
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(GatewayMessage::Reply {
            interaction_id: "i1".into(),
            content: "hi".into(),
            ephemeral: true,
        })
        .unwrap();
        assert_eq!(json["kind"], "reply");
        assert_eq!(json["ephemeral"], true);
    }

    #[tokio::test]
    async fn test_session_skips_malformed_lines() {
        let input = concat!(
            "{\"event\":\"member_remove\",\"guild_id\":\"g\",\"member_id\":\"5\"}\n",
            "not json\n",
            "\n",
            "{\"event\":\"teleport\"}\n",
            "{\"event\":\"member_remove\",\"guild_id\":\"g\",\"member_id\":\"6\"}\n",
        );
        let handler = Collect::default();
        let stats = run_session(input.as_bytes(), &handler).await.unwrap();

        assert_eq!(
            stats,
            SessionStats {
                lines: 4,
                dispatched: 2,
                malformed: 2
            }
        );
        assert_eq!(handler.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_writer_emits_one_line_per_message() {
        let (outbox, rx) = Outbox::channel();
        let (client, mut server) = tokio::io::duplex(4096);
        let writer = spawn_writer(rx, client);

        outbox.notice("i1", "first");
        outbox.notice("i2", "second");
        drop(outbox);
        assert_eq!(writer.await.unwrap().unwrap(), 2);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut out)
            .await
            .unwrap();
        let lines: Vec<GatewayMessage> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(matches!(
            &lines[1],
            GatewayMessage::Reply { content, .. } if content == "second"
        ));
    }
}
