//! Channel traits — the abstraction over chat platforms.
//!
//! A [`Channel`] connects Concierge to a messaging surface (CLI, chat apps,
//! webhooks). It yields inbound messages and delivers replies. The execution
//! core never talks to a channel directly; it publishes through
//! [`Outbound`], which a channel registry implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message arrived on
    pub channel_id: ChannelId,

    /// Sender identifier (platform-specific user ID)
    pub sender_id: String,

    /// The chat/group/DM identifier within the channel
    pub chat_id: String,

    /// Platform message ID, used to thread replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// The text content
    pub content: String,

    /// Media references (paths or URLs) attached to the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
}

impl InboundMessage {
    /// The session key this message belongs to.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel_id, self.chat_id)
    }
}

/// A message to deliver to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Target channel name
    pub channel: String,

    /// Target chat within the channel
    pub chat_id: String,

    /// Text to deliver
    pub content: String,

    /// Platform message ID to reply to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: None,
        }
    }

    pub fn replying_to(mut self, message_id: Option<String>) -> Self {
        self.reply_to = message_id;
        self
    }
}

/// Anything that can deliver text back to a user.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> std::result::Result<(), ChannelError>;
}

/// The core Channel trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "cli", "telegram").
    fn name(&self) -> &str;

    /// Unique ID for this channel instance.
    fn id(&self) -> &ChannelId;

    /// Start listening for incoming messages.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<InboundMessage, ChannelError>>,
        ChannelError,
    >;

    /// Send a message to a specific chat.
    async fn send(
        &self,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> std::result::Result<(), ChannelError>;

    /// Check if a sender is allowed (allowlist check).
    fn is_allowed(&self, sender_id: &str) -> bool;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_joins_channel_and_chat() {
        let msg = InboundMessage {
            channel_id: ChannelId("telegram".into()),
            sender_id: "12345".into(),
            chat_id: "67890".into(),
            message_id: Some("m1".into()),
            content: "Hello bot!".into(),
            media: vec![],
        };
        assert_eq!(msg.session_key(), "telegram:67890");
    }

    #[test]
    fn outbound_reply_threading() {
        let out = OutboundMessage::new("cli", "local", "done").replying_to(Some("m7".into()));
        assert_eq!(out.reply_to.as_deref(), Some("m7"));
    }
}
