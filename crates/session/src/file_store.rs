//! File-based session store — one JSON document per session.
//!
//! Storage location: `~/.concierge/sessions/<encoded key>.json`
//!
//! Records are loaded lazily on first access and written back on every
//! mutation, so a crash loses at most the write in flight.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concierge_core::error::SessionError;
use concierge_core::message::Message;
use concierge_core::session::{SessionFlags, SessionStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use crate::record::SessionRecord;

/// A file-backed session store.
pub struct FileSessionStore {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl FileSessionStore {
    /// Create a store rooted at `dir` (created on first write).
    pub fn new(dir: PathBuf) -> Self {
        debug!(dir = %dir.display(), "File session store opened");
        Self {
            dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Path of the document holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }

    fn load_from_disk(path: &Path, key: &str) -> Result<SessionRecord, SessionError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionRecord::new(key));
            }
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content).map_err(|e| SessionError::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn write_to_disk(&self, record: &SessionRecord) -> Result<(), SessionError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SessionError::Storage(format!("Failed to create session directory: {e}"))
        })?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize session: {e}")))?;
        std::fs::write(self.path_for(&record.key), json)
            .map_err(|e| SessionError::Storage(format!("Failed to write session file: {e}")))
    }

    /// Read a record through the cache without creating it.
    async fn read(&self, key: &str) -> Result<SessionRecord, SessionError> {
        if let Some(record) = self.cache.read().await.get(key) {
            return Ok(record.clone());
        }
        let record = match Self::load_from_disk(&self.path_for(key), key) {
            Ok(record) => record,
            Err(SessionError::Corrupted { key, reason }) => {
                warn!(session = %key, %reason, "Corrupted session file, starting fresh");
                SessionRecord::new(key)
            }
            Err(e) => return Err(e),
        };
        self.cache.write().await.insert(key.to_string(), record.clone());
        Ok(record)
    }

    /// Apply `f` to the record and persist it.
    async fn mutate(
        &self,
        key: &str,
        f: impl FnOnce(&mut SessionRecord),
    ) -> Result<(), SessionError> {
        let current = self.read(key).await?;
        let mut cache = self.cache.write().await;
        let record = cache.entry(key.to_string()).or_insert(current);
        f(record);
        self.write_to_disk(record)
    }
}

/// Make a session key safe to use as a file name. Reversible, so distinct
/// keys never share a file.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn history(&self, key: &str) -> Result<Vec<Message>, SessionError> {
        Ok(self.read(key).await?.history)
    }

    async fn set_history(&self, key: &str, history: Vec<Message>) -> Result<(), SessionError> {
        self.mutate(key, |r| {
            r.history = history;
            r.touch();
        })
        .await
    }

    async fn summary(&self, key: &str) -> Result<String, SessionError> {
        Ok(self.read(key).await?.summary)
    }

    async fn set_summary(&self, key: &str, summary: String) -> Result<(), SessionError> {
        self.mutate(key, |r| {
            r.summary = summary;
            r.touch();
        })
        .await
    }

    async fn flags(&self, key: &str) -> Result<SessionFlags, SessionError> {
        Ok(self.read(key).await?.flags)
    }

    async fn set_flags(&self, key: &str, flags: SessionFlags) -> Result<(), SessionError> {
        self.mutate(key, |r| r.flags = flags).await
    }

    async fn add_message(&self, key: &str, message: Message) -> Result<(), SessionError> {
        self.mutate(key, |r| {
            r.history.push(message);
            r.touch();
        })
        .await
    }

    async fn truncate_history(&self, key: &str, keep_last: usize) -> Result<(), SessionError> {
        self.mutate(key, |r| r.truncate_to_last(keep_last)).await
    }

    async fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionError> {
        Ok(self.read(key).await?.updated_at)
    }

    async fn reset(&self, key: &str) -> Result<(), SessionError> {
        self.mutate(key, SessionRecord::reset).await
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.cache.write().await.remove(key);
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to remove session file: {e}"
            ))),
        }
    }

    async fn save(&self, key: &str) -> Result<(), SessionError> {
        let cache = self.cache.read().await;
        match cache.get(key) {
            Some(record) => self.write_to_disk(record),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_is_filesystem_safe() {
        assert_eq!(encode_key("cli:local"), "cli%3Alocal");
        assert_eq!(encode_key("telegram:-100/9"), "telegram%3A-100%2F9");
        assert_ne!(encode_key("cli:local"), encode_key("cli_local"));
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSessionStore::new(dir.path().to_path_buf());
            store.add_message("cli:local", Message::user("hello")).await.unwrap();
            store.set_summary("cli:local", "greeted".into()).await.unwrap();
            store
                .set_flags("cli:local", SessionFlags { local_only: true, ..Default::default() })
                .await
                .unwrap();
        }

        let store = FileSessionStore::new(dir.path().to_path_buf());
        let history = store.history("cli:local").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
        assert_eq!(store.summary("cli:local").await.unwrap(), "greeted");
        assert!(store.flags("cli:local").await.unwrap().local_only);
        assert!(store.updated_at("cli:local").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reads_do_not_create_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().to_path_buf());
        assert!(store.history("ghost").await.unwrap().is_empty());
        assert!(!store.path_for("ghost").exists());
    }

    #[tokio::test]
    async fn corrupted_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("bad"), "{ not json").unwrap();
        assert!(store.history("bad").await.unwrap().is_empty());
        store.add_message("bad", Message::user("recovered")).await.unwrap();
        assert_eq!(store.history("bad").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().to_path_buf());
        store.add_message("k", Message::user("x")).await.unwrap();
        assert!(store.path_for("k").exists());
        store.remove("k").await.unwrap();
        assert!(!store.path_for("k").exists());
        store.remove("k").await.unwrap();
    }
}
