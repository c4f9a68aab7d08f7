//! # Concierge Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! Concierge assistant gateway. This crate has no framework dependencies;
//! it defines the model every other crate implements against.
//!
//! The routing and execution core (in `concierge-agent`) only ever talks to
//! the outside world through the traits defined here:
//! - [`Provider`] for language-model backends
//! - [`Tool`] for capabilities the model may invoke
//! - [`SessionStore`] for per-session history, summary, and flags
//! - [`Journal`] for long-term archived notes
//! - [`Outbound`] for publishing text back to a channel

pub mod channel;
pub mod error;
pub mod event;
pub mod identity;
pub mod journal;
pub mod message;
pub mod provider;
pub mod route;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, ChannelId, InboundMessage, Outbound, OutboundMessage};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use identity::Identity;
pub use journal::{Journal, JournalEntry};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use route::Route;
pub use session::{SessionFlags, SessionStore};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
