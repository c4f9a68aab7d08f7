//! Background summarization.
//!
//! When a session's history grows past the message threshold or its
//! estimated size passes a share of the context window, older messages are
//! folded into the running summary by a spawned task. At most one task runs
//! per session key; different sessions summarize concurrently.

use crate::binding::Binding;
use crate::context::token::{estimate_message_tokens, estimate_messages_tokens};
use chrono::Utc;
use concierge_core::error::Error;
use concierge_core::event::{DomainEvent, EventBus};
use concierge_core::message::{Message, Role};
use concierge_core::provider::ProviderRequest;
use concierge_core::session::SessionStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Messages always kept verbatim at the end of the history.
pub const KEEP_RECENT: usize = 4;

/// Above this many input messages the work is split in two and merged.
pub const SPLIT_ABOVE: usize = 10;

const SUMMARY_PROMPT: &str = "You maintain the running summary of a conversation between a user and \
their assistant. Keep facts, decisions, preferences, open tasks, and names. Drop small talk. \
Write compact plain-text notes, not a transcript.";

const MERGE_PROMPT: &str = "Merge these partial conversation summaries into one running summary. \
Keep every fact, decision, preference, and open task; remove duplication.";

/// Thresholds for when and how much to summarize.
#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// Context window of the bound models, in tokens
    pub context_window: usize,
    /// Summarize once history holds more than this many messages
    pub message_threshold: usize,
    /// Summarize once estimated tokens exceed this percent of the window
    pub token_percent: u8,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            context_window: 128_000,
            message_threshold: 20,
            token_percent: 75,
        }
    }
}

/// Background summarizer with a per-session in-flight guard.
#[derive(Clone)]
pub struct Summarizer {
    sessions: Arc<dyn SessionStore>,
    events: Arc<EventBus>,
    settings: SummarizerSettings,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Holds a session's slot in the in-flight set until dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.key);
    }
}

// A poisoned set is still a valid set of keys.
fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Summarizer {
    pub fn new(sessions: Arc<dyn SessionStore>, events: Arc<EventBus>, settings: SummarizerSettings) -> Self {
        Self {
            sessions,
            events,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether `history` is big enough to summarize.
    pub fn needs_summary(&self, history: &[Message]) -> bool {
        if history.len() > self.settings.message_threshold {
            return true;
        }
        let tokens = estimate_messages_tokens(history);
        tokens * 100 > self.settings.context_window * usize::from(self.settings.token_percent)
    }

    /// Whether a summarization task is running for `key`.
    pub fn is_running(&self, key: &str) -> bool {
        lock(&self.in_flight).contains(key)
    }

    fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        let mut set = lock(&self.in_flight);
        if !set.insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key: key.to_string(),
        })
    }

    /// Spawn a summarization task for `key` if its history needs one and no
    /// task is already running for it. Returns whether a task was spawned.
    pub async fn maybe_spawn(&self, key: &str, binding: &Binding) -> bool {
        let history = match self.sessions.history(key).await {
            Ok(history) => history,
            Err(e) => {
                warn!(session = %key, error = %e, "Cannot read history for summarization");
                return false;
            }
        };
        if !self.needs_summary(&history) {
            return false;
        }
        let Some(guard) = self.try_acquire(key) else {
            debug!(session = %key, "Summarization already running");
            return false;
        };

        let this = self.clone();
        let binding = binding.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = this.summarize_now(&key, &binding).await {
                warn!(session = %key, error = %e, "Background summarization failed");
            }
        });
        true
    }

    /// Summarize all but the most recent messages of `key` into its running
    /// summary. Returns how many messages were folded in.
    pub async fn summarize_now(&self, key: &str, binding: &Binding) -> Result<usize, Error> {
        let history = self.sessions.history(key).await?;
        if history.len() <= KEEP_RECENT {
            return Ok(0);
        }

        let mut cut = history.len() - KEEP_RECENT;
        while cut < history.len() && history[cut].role == Role::Tool {
            cut += 1;
        }

        let oversized = self.settings.context_window / 2;
        let mut input = Vec::new();
        let mut omitted = 0usize;
        for message in &history[..cut] {
            match message.role {
                Role::User | Role::Assistant => {}
                Role::System | Role::Tool => continue,
            }
            if estimate_message_tokens(message) > oversized {
                omitted += 1;
            } else {
                input.push(message);
            }
        }

        let existing = self.sessions.summary(key).await?;
        let mut summary = if input.is_empty() {
            existing.clone()
        } else if input.len() > SPLIT_ABOVE {
            let (older, newer) = input.split_at(input.len() / 2);
            let first = self.summarize_chunk(binding, "", older).await?;
            let second = self.summarize_chunk(binding, "", newer).await?;
            self.merge(binding, &existing, &first, &second).await?
        } else {
            self.summarize_chunk(binding, &existing, &input).await?
        };
        if omitted > 0 {
            summary.push_str(&format!(
                "\n\n[Note: {omitted} oversized message(s) were omitted from this summary.]"
            ));
        }

        // A reset or forced compression while the model was working replaces
        // the stored prefix. The result then describes history that is gone.
        let current = self.sessions.history(key).await?;
        let prefix_intact = current.len() >= cut
            && current[..cut].iter().zip(&history[..cut]).all(|(now, then)| now.id == then.id);
        if !prefix_intact || self.sessions.summary(key).await? != existing {
            info!(session = %key, "Session changed during summarization, discarding result");
            return Ok(0);
        }

        self.sessions.set_summary(key, summary).await?;

        // Only drop the summarized prefix; anything appended meanwhile stays.
        self.sessions.truncate_history(key, current.len() - cut).await?;
        self.sessions.save(key).await?;

        info!(session = %key, summarized = cut, omitted, "Updated running summary");
        self.events.publish(DomainEvent::SummaryUpdated {
            session: key.to_string(),
            summarized: cut,
            timestamp: Utc::now(),
        });
        Ok(cut)
    }

    async fn summarize_chunk(&self, binding: &Binding, existing: &str, messages: &[&Message]) -> Result<String, Error> {
        let mut body = String::new();
        if !existing.trim().is_empty() {
            body.push_str("Existing summary:\n");
            body.push_str(existing.trim());
            body.push_str("\n\nNew messages:\n");
        }
        for message in messages {
            body.push_str(message.role.as_str());
            body.push_str(": ");
            body.push_str(&message.content);
            body.push('\n');
        }
        self.call(binding, SUMMARY_PROMPT, body).await
    }

    async fn merge(&self, binding: &Binding, existing: &str, first: &str, second: &str) -> Result<String, Error> {
        let mut body = String::new();
        if !existing.trim().is_empty() {
            body.push_str("Earlier summary:\n");
            body.push_str(existing.trim());
            body.push_str("\n\n");
        }
        body.push_str("Part 1:\n");
        body.push_str(first);
        body.push_str("\n\nPart 2:\n");
        body.push_str(second);
        self.call(binding, MERGE_PROMPT, body).await
    }

    async fn call(&self, binding: &Binding, instructions: &str, body: String) -> Result<String, Error> {
        let request = ProviderRequest {
            model: binding.model.clone(),
            messages: vec![Message::system(instructions), Message::user(body)],
            temperature: 0.2,
            max_tokens: Some(1024),
            tools: vec![],
        };
        let response = binding.provider.complete(request).await?;
        Ok(response.message.content.trim().to_string())
    }
}
