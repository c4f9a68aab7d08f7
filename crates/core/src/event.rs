//! Domain event system — decoupled observation of what the core did.
//!
//! Events are published when a turn is routed, a tool runs, history is
//! compressed, and so on. Subscribers (logging sinks, tests, dashboards) can
//! react without the core knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use crate::route::Route;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new message was received from a channel
    MessageReceived {
        session: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The router settled on a route for a turn
    RouteDecided {
        session: String,
        route: Route,
        source: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A backend call returned
    ResponseGenerated {
        session: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        session: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// History was force-compressed after a context overflow
    HistoryCompressed {
        session: String,
        dropped: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },

    /// Background summarization replaced part of the history
    SummaryUpdated {
        session: String,
        summarized: usize,
        timestamp: DateTime<Utc>,
    },

    /// The conversational role handed a task to another role
    DelegationStarted {
        session: String,
        route: Route,
        timestamp: DateTime<Utc>,
    },

    /// A delegation finished; `redelegation_suppressed` is set when the
    /// finalizing call tried to delegate again
    DelegationCompleted {
        session: String,
        route: Route,
        redelegation_suppressed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A session crossed the daily boundary and was archived
    SessionCutover {
        session: String,
        logical_date: String,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::RouteDecided {
            session: "cli:local".into(),
            route: Route::Ops,
            source: "rules".into(),
            confidence: 1.0,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::RouteDecided { route, source, .. } => {
                assert_eq!(*route, Route::Ops);
                assert_eq!(source, "rules");
            }
            _ => panic!("Expected RouteDecided event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
