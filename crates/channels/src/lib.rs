//! Chat channel adapters for Concierge.
//!
//! Each channel connects to a chat surface and relays messages to and from
//! the routing core. The registry merges inbound streams and implements
//! `Outbound`, so the core can publish replies without knowing which
//! channel a session lives on.
//!
//! Available channels:
//! - **CLI** — Interactive terminal chat (stdin/stdout)
//! - **Registry** — Central channel manager and outbound dispatcher

pub mod cli;
pub mod registry;

pub use cli::CliChannel;
pub use registry::ChannelRegistry;
