//! CLI channel — interactive terminal-based chat.
//!
//! Reads from stdin, writes to stdout. Used for `concierge agent`.

use async_trait::async_trait;
use concierge_core::channel::{Channel, ChannelId, InboundMessage};
use concierge_core::error::ChannelError;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// The chat ID every CLI message uses, so the terminal is one session.
pub const CLI_CHAT_ID: &str = "local";

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId("cli".into()),
        }
    }

    /// Build the inbound message for one typed line.
    pub fn inbound(&self, seq: u64, content: impl Into<String>) -> InboundMessage {
        InboundMessage {
            channel_id: self.id.clone(),
            sender_id: "local_user".into(),
            chat_id: CLI_CHAT_ID.into(),
            message_id: Some(format!("cli-{seq}")),
            content: content.into(),
            media: vec![],
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<InboundMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let template = CliChannel {
            id: self.id.clone(),
        };

        tokio::spawn(async move {
            let mut lines = BufReader::new(io::stdin()).lines();
            let mut seq = 0u64;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit(&line) {
                            break;
                        }

                        seq += 1;
                        if tx.send(Ok(template.inbound(seq, line))).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(
        &self,
        _chat_id: &str,
        content: &str,
        _reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        println!("{content}\n");
        Ok(())
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        true // CLI is always allowed (local user)
    }
}
