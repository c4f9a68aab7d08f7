//! In-memory backends — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use concierge_core::error::SessionError;
use concierge_core::journal::{Journal, JournalEntry};
use concierge_core::message::Message;
use concierge_core::session::{SessionFlags, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::record::SessionRecord;

/// A session store that keeps every record in a `HashMap`.
pub struct InMemorySessionStore {
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether a session exists.
    pub async fn contains(&self, key: &str) -> bool {
        self.records.read().await.contains_key(key)
    }

    /// Overwrite the last-updated timestamp (used to simulate elapsed time).
    pub async fn set_updated_at(&self, key: &str, at: DateTime<Utc>) {
        self.records
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| SessionRecord::new(key))
            .updated_at = Some(at);
    }

    async fn with_record<T>(&self, key: &str, f: impl FnOnce(&mut SessionRecord) -> T) -> T {
        let mut records = self.records.write().await;
        let record = records
            .entry(key.to_string())
            .or_insert_with(|| SessionRecord::new(key));
        f(record)
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn history(&self, key: &str) -> Result<Vec<Message>, SessionError> {
        Ok(self
            .records
            .read()
            .await
            .get(key)
            .map(|r| r.history.clone())
            .unwrap_or_default())
    }

    async fn set_history(&self, key: &str, history: Vec<Message>) -> Result<(), SessionError> {
        self.with_record(key, |r| {
            r.history = history;
            r.touch();
        })
        .await;
        Ok(())
    }

    async fn summary(&self, key: &str) -> Result<String, SessionError> {
        Ok(self
            .records
            .read()
            .await
            .get(key)
            .map(|r| r.summary.clone())
            .unwrap_or_default())
    }

    async fn set_summary(&self, key: &str, summary: String) -> Result<(), SessionError> {
        self.with_record(key, |r| {
            r.summary = summary;
            r.touch();
        })
        .await;
        Ok(())
    }

    async fn flags(&self, key: &str) -> Result<SessionFlags, SessionError> {
        Ok(self
            .records
            .read()
            .await
            .get(key)
            .map(|r| r.flags.clone())
            .unwrap_or_default())
    }

    async fn set_flags(&self, key: &str, flags: SessionFlags) -> Result<(), SessionError> {
        self.with_record(key, |r| r.flags = flags).await;
        Ok(())
    }

    async fn add_message(&self, key: &str, message: Message) -> Result<(), SessionError> {
        self.with_record(key, |r| {
            r.history.push(message);
            r.touch();
        })
        .await;
        Ok(())
    }

    async fn truncate_history(&self, key: &str, keep_last: usize) -> Result<(), SessionError> {
        self.with_record(key, |r| r.truncate_to_last(keep_last)).await;
        Ok(())
    }

    async fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionError> {
        Ok(self.records.read().await.get(key).and_then(|r| r.updated_at))
    }

    async fn reset(&self, key: &str) -> Result<(), SessionError> {
        self.with_record(key, SessionRecord::reset).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn save(&self, _key: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

/// A journal that keeps entries in a Vec.
pub struct InMemoryJournal {
    entries: Arc<RwLock<Vec<JournalEntry>>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of everything written so far.
    pub async fn all(&self) -> Vec<JournalEntry> {
        self.entries.read().await.clone()
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, mut entry: JournalEntry) -> Result<String, SessionError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        Ok(id)
    }

    async fn entries_for(&self, date: NaiveDate) -> Result<Vec<JournalEntry>, SessionError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.logical_date == date)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, SessionError> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let store = InMemorySessionStore::new();
        assert!(store.history("nope").await.unwrap().is_empty());
        assert!(store.summary("nope").await.unwrap().is_empty());
        assert_eq!(store.flags("nope").await.unwrap(), SessionFlags::default());
        assert!(store.updated_at("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_and_truncate() {
        let store = InMemorySessionStore::new();
        for i in 0..6 {
            store.add_message("k", Message::user(format!("m{i}"))).await.unwrap();
        }
        store.truncate_history("k", 3).await.unwrap();
        let history = store.history("k").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "m3");
    }

    #[tokio::test]
    async fn flag_writes_do_not_bump_updated_at() {
        let store = InMemorySessionStore::new();
        store
            .set_flags("k", SessionFlags { local_only: true, ..Default::default() })
            .await
            .unwrap();
        assert!(store.updated_at("k").await.unwrap().is_none());
        assert!(store.flags("k").await.unwrap().local_only);
    }

    #[tokio::test]
    async fn reset_clears_content_and_keeps_flags() {
        let store = InMemorySessionStore::new();
        store.add_message("k", Message::user("hi")).await.unwrap();
        store.set_summary("k", "old".into()).await.unwrap();
        store
            .set_flags("k", SessionFlags { local_only: true, ..Default::default() })
            .await
            .unwrap();
        let before = Utc::now();
        store.reset("k").await.unwrap();

        assert!(store.history("k").await.unwrap().is_empty());
        assert!(store.summary("k").await.unwrap().is_empty());
        assert!(store.flags("k").await.unwrap().local_only);
        assert!(store.updated_at("k").await.unwrap().unwrap() >= before);
    }

    #[tokio::test]
    async fn remove_forgets_session() {
        let store = InMemorySessionStore::new();
        store.add_message("k", Message::user("hi")).await.unwrap();
        assert!(store.contains("k").await);
        store.remove("k").await.unwrap();
        assert!(!store.contains("k").await);
    }

    #[tokio::test]
    async fn journal_filters_by_date() {
        let journal = InMemoryJournal::new();
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let other = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        for date in [day, other, day] {
            journal
                .append(JournalEntry {
                    id: String::new(),
                    session_key: "cli:local".into(),
                    logical_date: date,
                    content: "note".into(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert_eq!(journal.count().await.unwrap(), 3);
        assert_eq!(journal.entries_for(day).await.unwrap().len(), 2);
    }
}
