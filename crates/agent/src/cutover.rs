//! Daily cutover gate.
//!
//! A logical day starts at a fixed local hour in a fixed UTC offset. A
//! session last touched before the most recent boundary is archived to the
//! journal and reset (flags survive) before its next turn runs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use concierge_config::CutoverConfig;
use concierge_core::error::Error;
use concierge_core::event::{DomainEvent, EventBus};
use concierge_core::journal::{Journal, JournalEntry};
use concierge_core::message::Message;
use concierge_core::session::SessionStore;
use std::sync::Arc;
use tracing::{debug, info};

/// What the gate did for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutoverOutcome {
    /// Gate is switched off
    Disabled,
    /// Nothing stored for the session yet
    Fresh,
    /// Session belongs to the current logical day
    Current,
    /// Session was reset; `archived` is false when there was nothing to keep
    Rolled { logical_date: NaiveDate, archived: bool },
}

pub struct CutoverGate {
    sessions: Arc<dyn SessionStore>,
    journal: Arc<dyn Journal>,
    events: Arc<EventBus>,
    enabled: bool,
    start_of_day: NaiveTime,
    day_shift: TimeDelta,
    offset: TimeDelta,
    archive_lines: usize,
    archive_line_chars: usize,
}

impl CutoverGate {
    pub fn new(
        config: &CutoverConfig,
        sessions: Arc<dyn SessionStore>,
        journal: Arc<dyn Journal>,
        events: Arc<EventBus>,
    ) -> Result<Self, Error> {
        let start_of_day = NaiveTime::from_hms_opt(config.hour, 0, 0).ok_or_else(|| Error::Config {
            message: format!("cutover.hour must be below 24, got {}", config.hour),
        })?;
        Ok(Self {
            sessions,
            journal,
            events,
            enabled: config.enabled,
            start_of_day,
            day_shift: TimeDelta::hours(i64::from(config.hour)),
            offset: TimeDelta::minutes(i64::from(config.utc_offset_minutes)),
            archive_lines: config.archive_lines,
            archive_line_chars: config.archive_line_chars,
        })
    }

    fn local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.naive_utc() + self.offset
    }

    /// The most recent boundary instant at or before `now`.
    pub fn boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = self.local(now);
        let mut boundary = local.date().and_time(self.start_of_day);
        if boundary > local {
            boundary -= TimeDelta::days(1);
        }
        (boundary - self.offset).and_utc()
    }

    /// The logical day `at` belongs to. Activity before the boundary hour
    /// counts toward the previous day.
    pub fn logical_date(&self, at: DateTime<Utc>) -> NaiveDate {
        (self.local(at) - self.day_shift).date()
    }

    /// Archive and reset `key` if it was last touched before the current
    /// boundary. Running it twice in a row resets at most once.
    pub async fn check(&self, key: &str, now: DateTime<Utc>) -> Result<CutoverOutcome, Error> {
        if !self.enabled {
            return Ok(CutoverOutcome::Disabled);
        }
        let Some(updated_at) = self.sessions.updated_at(key).await? else {
            return Ok(CutoverOutcome::Fresh);
        };
        let boundary = self.boundary(now);
        if updated_at >= boundary {
            return Ok(CutoverOutcome::Current);
        }

        let logical_date = self.logical_date(updated_at);
        let summary = self.sessions.summary(key).await?;
        let history = self.sessions.history(key).await?;
        let note = self.archive_note(&summary, &history);

        let archived = !note.is_empty();
        if archived {
            self.journal
                .append(JournalEntry {
                    id: String::new(),
                    session_key: key.to_string(),
                    logical_date,
                    content: note,
                    created_at: now,
                })
                .await?;
        } else {
            debug!(session = %key, "Nothing to archive at cutover");
        }

        self.sessions.reset(key).await?;
        self.sessions.save(key).await?;

        info!(session = %key, %logical_date, archived, "Session cut over to a new day");
        self.events.publish(DomainEvent::SessionCutover {
            session: key.to_string(),
            logical_date: logical_date.to_string(),
            timestamp: now,
        });
        Ok(CutoverOutcome::Rolled { logical_date, archived })
    }

    fn archive_note(&self, summary: &str, history: &[Message]) -> String {
        let mut note = String::new();
        let summary = summary.trim();
        if !summary.is_empty() {
            note.push_str("## Summary\n");
            note.push_str(summary);
        }

        let start = history.len().saturating_sub(self.archive_lines);
        let lines: Vec<String> = history[start..]
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| format!("{}: {}", m.role.as_str(), self.flatten(&m.content)))
            .collect();
        if !lines.is_empty() {
            if !note.is_empty() {
                note.push_str("\n\n");
            }
            note.push_str("## Recent\n");
            note.push_str(&lines.join("\n"));
        }
        note
    }

    fn flatten(&self, content: &str) -> String {
        let line = content.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.chars().count() <= self.archive_line_chars {
            return line;
        }
        let cut: String = line.chars().take(self.archive_line_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use concierge_core::session::SessionFlags;
    use concierge_session::{InMemoryJournal, InMemorySessionStore};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    struct Harness {
        store: Arc<InMemorySessionStore>,
        journal: Arc<InMemoryJournal>,
        gate: CutoverGate,
    }

    fn harness(config: CutoverConfig) -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let journal = Arc::new(InMemoryJournal::new());
        let gate = CutoverGate::new(&config, store.clone(), journal.clone(), Arc::new(EventBus::default())).unwrap();
        Harness { store, journal, gate }
    }

    #[test]
    fn boundary_at_default_hour() {
        let h = harness(CutoverConfig::default());
        assert_eq!(h.gate.boundary(at(2026, 3, 14, 3, 59)), at(2026, 3, 13, 4, 0));
        assert_eq!(h.gate.boundary(at(2026, 3, 14, 4, 0)), at(2026, 3, 14, 4, 0));
        assert_eq!(h.gate.boundary(at(2026, 3, 14, 23, 0)), at(2026, 3, 14, 4, 0));
    }

    #[test]
    fn boundary_respects_offset() {
        let h = harness(CutoverConfig {
            utc_offset_minutes: 120,
            ..Default::default()
        });
        // 04:00 at UTC+2 is 02:00 UTC
        assert_eq!(h.gate.boundary(at(2026, 3, 14, 3, 0)), at(2026, 3, 14, 2, 0));
        assert_eq!(h.gate.boundary(at(2026, 3, 14, 1, 0)), at(2026, 3, 13, 2, 0));
    }

    #[test]
    fn late_night_belongs_to_previous_day() {
        let h = harness(CutoverConfig::default());
        assert_eq!(h.gate.logical_date(at(2026, 3, 14, 2, 30)), date(2026, 3, 13));
        assert_eq!(h.gate.logical_date(at(2026, 3, 14, 4, 0)), date(2026, 3, 14));
    }

    #[test]
    fn invalid_hour_is_rejected() {
        let config = CutoverConfig {
            hour: 24,
            ..Default::default()
        };
        let result = CutoverGate::new(
            &config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryJournal::new()),
            Arc::new(EventBus::default()),
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn unknown_session_is_fresh() {
        let h = harness(CutoverConfig::default());
        assert_eq!(h.gate.check("cli:local", Utc::now()).await.unwrap(), CutoverOutcome::Fresh);
    }

    #[tokio::test]
    async fn stale_session_is_archived_and_reset_once() {
        let h = harness(CutoverConfig::default());
        h.store.add_message("cli:local", Message::user("plan my week")).await.unwrap();
        h.store.add_message("cli:local", Message::assistant("Here is a plan")).await.unwrap();
        h.store.set_summary("cli:local", "Talked about planning".into()).await.unwrap();
        h.store
            .set_flags("cli:local", SessionFlags { local_only: true, ..Default::default() })
            .await
            .unwrap();
        let now = Utc::now();
        h.store.set_updated_at("cli:local", now - TimeDelta::days(2)).await;

        let first = h.gate.check("cli:local", now).await.unwrap();
        assert!(matches!(first, CutoverOutcome::Rolled { archived: true, .. }));
        let second = h.gate.check("cli:local", now).await.unwrap();
        assert_eq!(second, CutoverOutcome::Current);

        assert_eq!(h.journal.count().await.unwrap(), 1);
        let entry = &h.journal.all().await[0];
        assert!(entry.content.contains("Talked about planning"));
        assert!(entry.content.contains("user: plan my week"));
        assert!(entry.content.contains("assistant: Here is a plan"));

        assert!(h.store.history("cli:local").await.unwrap().is_empty());
        assert!(h.store.summary("cli:local").await.unwrap().is_empty());
        assert!(h.store.flags("cli:local").await.unwrap().local_only);
    }

    #[tokio::test]
    async fn recent_session_is_left_alone() {
        let h = harness(CutoverConfig::default());
        h.store.add_message("cli:local", Message::user("hi")).await.unwrap();
        let outcome = h.gate.check("cli:local", Utc::now()).await.unwrap();
        assert_eq!(outcome, CutoverOutcome::Current);
        assert_eq!(h.store.history("cli:local").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn archive_keeps_last_lines_truncated() {
        let h = harness(CutoverConfig {
            archive_lines: 2,
            archive_line_chars: 10,
            ..Default::default()
        });
        for text in ["first", "second", "a fairly long\nmultiline message"] {
            h.store.add_message("k", Message::user(text)).await.unwrap();
        }
        let now = Utc::now();
        h.store.set_updated_at("k", now - TimeDelta::days(1) - TimeDelta::hours(1)).await;
        h.gate.check("k", now).await.unwrap();

        let content = &h.journal.all().await[0].content;
        assert!(!content.contains("first"));
        assert!(content.contains("user: second"));
        assert!(content.contains("user: a fairly l..."));
    }

    #[tokio::test]
    async fn empty_stale_session_resets_without_archive() {
        let h = harness(CutoverConfig::default());
        let now = Utc::now();
        h.store.set_updated_at("k", now - TimeDelta::days(3)).await;
        let outcome = h.gate.check("k", now).await.unwrap();
        assert!(matches!(outcome, CutoverOutcome::Rolled { archived: false, .. }));
        assert_eq!(h.journal.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_gate_does_nothing() {
        let h = harness(CutoverConfig {
            enabled: false,
            ..Default::default()
        });
        h.store.add_message("k", Message::user("hi")).await.unwrap();
        h.store.set_updated_at("k", Utc::now() - TimeDelta::days(5)).await;
        assert_eq!(h.gate.check("k", Utc::now()).await.unwrap(), CutoverOutcome::Disabled);
        assert_eq!(h.store.history("k").await.unwrap().len(), 1);
    }
}
