//! Session and journal backends for Concierge.
//!
//! Provides:
//! - **In-memory** session store and journal (tests, ephemeral runs)
//! - **File** session store: one JSON document per session
//! - **File** journal: append-only JSON lines

pub mod file_journal;
pub mod file_store;
pub mod in_memory;
pub mod record;

pub use file_journal::FileJournal;
pub use file_store::FileSessionStore;
pub use in_memory::{InMemoryJournal, InMemorySessionStore};
pub use record::SessionRecord;
