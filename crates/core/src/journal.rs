//! Journal trait — long-term storage for archived session notes.
//!
//! The cutover gate writes one entry per archived session per logical day.
//! Entries are append-only; lookups are by logical date.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use crate::error::SessionError;

/// One archived note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique ID for this entry
    pub id: String,

    /// Session the note was archived from
    pub session_key: String,

    /// The logical day the archived activity belongs to
    pub logical_date: NaiveDate,

    /// Formatted note (summary plus recent lines)
    pub content: String,

    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

/// The core Journal trait.
#[async_trait]
pub trait Journal: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Append an entry; returns its ID.
    async fn append(&self, entry: JournalEntry) -> std::result::Result<String, SessionError>;

    /// All entries for a logical date, in write order.
    async fn entries_for(&self, date: NaiveDate) -> std::result::Result<Vec<JournalEntry>, SessionError>;

    /// Total number of entries.
    async fn count(&self) -> std::result::Result<usize, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_entry_serialization() {
        let entry = JournalEntry {
            id: "j1".into(),
            session_key: "cli:local".into(),
            logical_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            content: "## Summary\nTalked about Rust".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("2026-03-14"));
        assert!(json.contains("cli:local"));
    }
}
