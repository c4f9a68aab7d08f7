//! File-based journal — append-only JSON lines.
//!
//! Storage location: `~/.concierge/journal.jsonl`
//!
//! Each line is one `JournalEntry`. Entries are loaded on open and appended
//! to the file as they are written.

use async_trait::async_trait;
use chrono::NaiveDate;
use concierge_core::error::SessionError;
use concierge_core::journal::{Journal, JournalEntry};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct FileJournal {
    path: PathBuf,
    entries: Arc<RwLock<Vec<JournalEntry>>>,
}

impl FileJournal {
    /// Open the journal at `path`; a missing file means an empty journal.
    pub fn new(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "Journal loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    fn load_from_disk(path: &Path) -> Vec<JournalEntry> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Vec::new();
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted journal line");
                    None
                }
            })
            .collect()
    }

    fn append_line(&self, entry: &JournalEntry) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::Journal(format!("Failed to create journal directory: {e}"))
            })?;
        }
        let line = serde_json::to_string(entry)
            .map_err(|e| SessionError::Journal(format!("Failed to serialize entry: {e}")))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SessionError::Journal(format!("Failed to open journal: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| SessionError::Journal(format!("Failed to append to journal: {e}")))
    }
}

#[async_trait]
impl Journal for FileJournal {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, mut entry: JournalEntry) -> Result<String, SessionError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        let mut entries = self.entries.write().await;
        self.append_line(&entry)?;
        entries.push(entry);
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
