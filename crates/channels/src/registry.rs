//! Channel registry — manages all active channel instances.
//!
//! Merges inbound messages from every channel into one stream and
//! dispatches outbound replies back to the channel they belong to.

use async_trait::async_trait;
use concierge_core::channel::{Channel, InboundMessage, Outbound, OutboundMessage};
use concierge_core::error::ChannelError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Central registry holding all enabled channel instances.
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Register a channel adapter.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "Registered channel");
        self.channels.insert(name, channel);
    }

    /// Get a channel by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// List all registered channel names.
    pub fn list(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start all channels and merge their message streams into one receiver.
    ///
    /// Messages from senders a channel does not allow are dropped here.
    pub async fn start_all(&self) -> Result<mpsc::Receiver<InboundMessage>, ChannelError> {
        let (merged_tx, merged_rx) = mpsc::channel(256);

        for (name, channel) in &self.channels {
            let mut rx = channel.start().await?;
            let tx = merged_tx.clone();
            let channel = Arc::clone(channel);
            let channel_name = name.clone();

            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    let msg = match msg {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(channel = %channel_name, error = %e, "Channel receive error");
                            continue;
                        }
                    };
                    if !channel.is_allowed(&msg.sender_id) {
                        debug!(channel = %channel_name, sender = %msg.sender_id, "Dropping message from disallowed sender");
                        continue;
                    }
                    if tx.send(msg).await.is_err() {
                        break; // Merged receiver dropped
                    }
                }
            });

            info!(channel = %name, "Started channel");
        }

        Ok(merged_rx)
    }

    /// Send a message to a specific channel.
    pub async fn send_to(
        &self,
        channel_name: &str,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        let channel = self.channels.get(channel_name).ok_or_else(|| {
            ChannelError::NotConfigured(format!("Channel '{channel_name}' not found"))
        })?;

        channel.send(chat_id, content, reply_to).await
    }

    /// Stop all channels gracefully.
    pub async fn stop_all(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!(channel = %name, error = %e, "Failed to stop channel");
            }
        }
    }
}

#[async_trait]
impl Outbound for ChannelRegistry {
    async fn publish(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.send_to(
            &message.channel,
            &message.chat_id,
            &message.content,
            message.reply_to.as_deref(),
        )
        .await
    }
}
