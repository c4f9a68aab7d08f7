//! Session trait — per-session history, running summary, and flags.
//!
//! Every operation is keyed by an opaque session key (for channel traffic,
//! `"<channel>:<chat_id>"`; for delegated sub-turns, a synthetic key derived
//! from the parent). A session record is created lazily on first write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::SessionError;
use crate::message::Message;
use crate::route::Route;

/// Per-session state persisted across turns until a cutover reset (which
/// clears history and summary but keeps flags).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFlags {
    /// Only local models may be used; coder routes are refused.
    #[serde(default)]
    pub local_only: bool,

    /// Route of the last turn that ran the loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_primary_route: Option<Route>,

    /// Remaining turns the work overlay stays active.
    #[serde(default)]
    pub work_overlay_turns_left: u32,

    /// Directive injected into the prompt while the overlay is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_overlay_directive: Option<String>,

    /// Message that started a delegation, so the final answer can reply to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_message_id: Option<String>,

    /// Route the origin message was delegated to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_route: Option<Route>,

    /// A delegated answer still has to be threaded to the origin message.
    #[serde(default)]
    pub pending_origin_reply: bool,
}

impl SessionFlags {
    /// The overlay directive if the overlay still has turns left.
    pub fn active_overlay(&self) -> Option<&str> {
        if self.work_overlay_turns_left == 0 {
            return None;
        }
        self.work_overlay_directive.as_deref()
    }

    /// Turn the overlay on for `turns` turns.
    pub fn enable_overlay(&mut self, directive: impl Into<String>, turns: u32) {
        self.work_overlay_directive = Some(directive.into());
        self.work_overlay_turns_left = turns;
    }

    pub fn clear_overlay(&mut self) {
        self.work_overlay_directive = None;
        self.work_overlay_turns_left = 0;
    }

    /// Spend one overlay turn; clears the directive once exhausted.
    pub fn consume_overlay_turn(&mut self) {
        if self.work_overlay_turns_left == 0 {
            return;
        }
        self.work_overlay_turns_left -= 1;
        if self.work_overlay_turns_left == 0 {
            self.work_overlay_directive = None;
        }
    }

    pub fn clear_origin(&mut self) {
        self.origin_message_id = None;
        self.origin_route = None;
        self.pending_origin_reply = false;
    }
}

/// Storage for session history, summary, and flags.
///
/// Implementations: in-memory (tests, ephemeral runs) and file-backed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Full message history, oldest first. Empty for unknown sessions.
    async fn history(&self, key: &str) -> std::result::Result<Vec<Message>, SessionError>;

    /// Replace the history.
    async fn set_history(&self, key: &str, history: Vec<Message>) -> std::result::Result<(), SessionError>;

    /// The running summary. Empty for unknown sessions.
    async fn summary(&self, key: &str) -> std::result::Result<String, SessionError>;

    async fn set_summary(&self, key: &str, summary: String) -> std::result::Result<(), SessionError>;

    /// Flags, defaulted for unknown sessions.
    async fn flags(&self, key: &str) -> std::result::Result<SessionFlags, SessionError>;

    async fn set_flags(&self, key: &str, flags: SessionFlags) -> std::result::Result<(), SessionError>;

    /// Append one message to the history.
    async fn add_message(&self, key: &str, message: Message) -> std::result::Result<(), SessionError>;

    /// Keep only the last `keep_last` messages.
    async fn truncate_history(&self, key: &str, keep_last: usize) -> std::result::Result<(), SessionError>;

    /// When history or summary last changed. `None` for unknown sessions.
    async fn updated_at(&self, key: &str) -> std::result::Result<Option<DateTime<Utc>>, SessionError>;

    /// Clear history and summary, keep flags, and mark the session updated now.
    async fn reset(&self, key: &str) -> std::result::Result<(), SessionError>;

    /// Forget the session entirely.
    async fn remove(&self, key: &str) -> std::result::Result<(), SessionError>;

    /// Persist the session (no-op for purely in-memory stores).
    async fn save(&self, key: &str) -> std::result::Result<(), SessionError>;
}
