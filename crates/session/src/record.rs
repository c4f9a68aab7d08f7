//! The persisted shape of one session.

use chrono::{DateTime, Utc};
use concierge_core::message::Message;
use concierge_core::session::SessionFlags;
use serde::{Deserialize, Serialize};

/// History, running summary, and flags for a single session key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    pub key: String,

    #[serde(default)]
    pub history: Vec<Message>,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub flags: SessionFlags,

    /// Last change to history or summary. Flag writes do not bump it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    pub fn truncate_to_last(&mut self, keep_last: usize) {
        let len = self.history.len();
        if len > keep_last {
            self.history.drain(..len - keep_last);
        }
        self.touch();
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.summary.clear();
        self.touch();
    }
}
