//! Serial inbound processing.
//!
//! One inbound message runs through:
//!
//! 1. The cutover gate
//! 2. Session commands (`/work`, `/normal`, `/new`)
//! 3. The router
//! 4. The loop on the chosen route's binding
//! 5. Delegation, when the conversational role hands the task off
//!
//! Flags are loaded at the start of the turn and persisted at the end.

use crate::binding::Bindings;
use crate::commands::{NEW_USAGE, SessionCommand, WORK_USAGE, parse_session_command};
use crate::cutover::CutoverGate;
use crate::delegation::{DelegationContext, DelegationCoordinator, DelegationSettings, parse_directive};
use crate::loop_runner::{AgentLoop, ProcessOptions, TurnStatus};
use crate::routing::Router;
use chrono::Utc;
use concierge_config::AppConfig;
use concierge_core::channel::InboundMessage;
use concierge_core::error::Error;
use concierge_core::event::DomainEvent;
use concierge_core::route::Route;
use concierge_core::session::SessionFlags;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub const APOLOGY_MESSAGE: &str = "Sorry, something went wrong while handling that message. Please try again.";

const PREVIEW_CHARS: usize = 80;

/// Budgets and overlay defaults for a runtime.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub max_loops: u32,
    pub max_millis: u64,
    pub delegation: DelegationSettings,
    pub overlay_turns: u32,
    pub overlay_directive: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_loops: config.agent.max_loops,
            max_millis: config.agent.max_millis,
            delegation: DelegationSettings {
                max_loops: config.agent.delegation_max_loops,
                max_millis: config.agent.delegation_max_millis,
            },
            overlay_turns: config.overlay.default_turns.max(1),
            overlay_directive: config.overlay.directive.clone(),
        }
    }
}

pub struct Runtime {
    agent: Arc<AgentLoop>,
    router: Router,
    bindings: Bindings,
    coordinator: DelegationCoordinator,
    cutover: Option<CutoverGate>,
    settings: RuntimeSettings,
}

impl Runtime {
    pub fn new(agent: Arc<AgentLoop>, router: Router, bindings: Bindings, settings: RuntimeSettings) -> Self {
        let coordinator = DelegationCoordinator::new(agent.clone(), bindings.clone(), settings.delegation.clone());
        Self {
            agent,
            router,
            bindings,
            coordinator,
            cutover: None,
            settings,
        }
    }

    pub fn with_cutover(mut self, gate: CutoverGate) -> Self {
        self.cutover = Some(gate);
        self
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    /// Handle one inbound message and return the text delivered for it.
    pub async fn process_message(&self, msg: InboundMessage) -> Result<String, Error> {
        let key = msg.session_key();
        let channel = msg.channel_id.0.clone();
        let sessions = self.agent.sessions();

        self.agent.events().publish(DomainEvent::MessageReceived {
            session: key.clone(),
            content_preview: msg.content.chars().take(PREVIEW_CHARS).collect(),
            timestamp: Utc::now(),
        });

        if let Some(gate) = &self.cutover {
            gate.check(&key, Utc::now()).await?;
        }

        let mut flags = sessions.flags(&key).await?;

        if let Some(command) = parse_session_command(&msg.content) {
            let reply = self.apply_command(&key, &mut flags, command).await?;
            self.finish(&key, flags).await?;
            self.agent.publish(&channel, &msg.chat_id, &reply, msg.message_id.clone()).await;
            return Ok(reply);
        }

        let decision = self.router.decide(&msg.content, &flags).await;
        info!(
            session = %key,
            route = %decision.route,
            source = decision.source.as_str(),
            confidence = decision.confidence,
            reason = %decision.reason,
            "Route decided"
        );
        self.agent.events().publish(DomainEvent::RouteDecided {
            session: key.clone(),
            route: decision.route,
            source: decision.source.as_str().to_string(),
            confidence: decision.confidence,
            timestamp: Utc::now(),
        });

        flags.local_only = decision.local_only;
        flags.prev_primary_route = Some(decision.route);

        if let Some(reply) = decision.direct_response.clone() {
            self.finish(&key, flags).await?;
            self.agent.publish(&channel, &msg.chat_id, &reply, msg.message_id.clone()).await;
            return Ok(reply);
        }

        let binding = self.bindings.resolve(decision.route, flags.local_only);
        let overlay = flags.active_overlay().map(str::to_string);
        let mut opts = ProcessOptions::new(&key, &channel, &msg.chat_id, decision.clean_user_text.clone())
            .with_budget(self.settings.max_loops, self.settings.max_millis);
        opts.media = msg.media.clone();
        opts.overlay = overlay.clone();

        let turn = self.agent.process(&binding, opts).await?;
        if overlay.is_some() {
            flags.consume_overlay_turn();
        }

        let mut reply = turn.content;
        let mut reply_to = msg.message_id.clone();

        let directive = match (decision.route, turn.status) {
            (Route::Chat, TurnStatus::Completed) => parse_directive(&reply),
            _ => None,
        };
        if let Some(directive) = directive {
            flags.origin_message_id = msg.message_id.clone();
            flags.origin_route = Some(directive.route);
            flags.pending_origin_reply = true;
            self.finish(&key, flags.clone()).await?;

            let ctx = DelegationContext {
                session_key: &key,
                channel: &channel,
                chat_id: &msg.chat_id,
                local_only: flags.local_only,
            };
            let outcome = match self.coordinator.run(&ctx, &directive).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    flags.clear_origin();
                    self.finish(&key, flags).await?;
                    return Err(e);
                }
            };
            reply = outcome.content;
            reply_to = flags.origin_message_id.clone();
            flags.clear_origin();
        }

        if let Some(declaration) = &decision.declaration {
            reply = format!("{declaration}\n\n{reply}");
        }

        self.finish(&key, flags).await?;
        self.agent.publish(&channel, &msg.chat_id, &reply, reply_to).await;
        Ok(reply)
    }

    async fn finish(&self, key: &str, flags: SessionFlags) -> Result<(), Error> {
        let sessions = self.agent.sessions();
        sessions.set_flags(key, flags).await?;
        sessions.save(key).await?;
        Ok(())
    }

    async fn apply_command(&self, key: &str, flags: &mut SessionFlags, command: SessionCommand) -> Result<String, Error> {
        debug!(session = %key, ?command, "Session command");
        let reply = match command {
            SessionCommand::WorkOn(turns) => {
                let turns = turns.unwrap_or(self.settings.overlay_turns);
                flags.enable_overlay(self.settings.overlay_directive.clone(), turns);
                format!("Work mode on for the next {turns} turn(s).")
            }
            SessionCommand::WorkOff => {
                flags.clear_overlay();
                "Work mode off.".to_string()
            }
            SessionCommand::WorkStatus => match flags.active_overlay() {
                Some(_) => format!("Work mode is on: {} turn(s) left.", flags.work_overlay_turns_left),
                None => "Work mode is off.".to_string(),
            },
            SessionCommand::WorkUsage => WORK_USAGE.to_string(),
            SessionCommand::NewUsage => NEW_USAGE.to_string(),
            SessionCommand::NewSession => {
                self.agent.sessions().reset(key).await?;
                info!(session = %key, "Session reset on request");
                "Started a fresh session. History and summary were cleared.".to_string()
            }
        };
        Ok(reply)
    }

    /// Process messages one at a time until the sender side closes.
    pub async fn serve(&self, mut rx: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = rx.recv().await {
            let key = msg.session_key();
            let channel = msg.channel_id.0.clone();
            let chat_id = msg.chat_id.clone();
            let reply_to = msg.message_id.clone();

            if let Err(e) = self.process_message(msg).await {
                error!(session = %key, error = %e, "Failed to process message");
                self.agent.events().publish(DomainEvent::ErrorOccurred {
                    context: key,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.agent.publish(&channel, &chat_id, APOLOGY_MESSAGE, reply_to).await;
            }
        }
        info!("Inbound stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assembler::DefaultAssembler;
    use crate::routing::RouterSettings;
    use crate::test_helpers::{CaptureOutbound, EchoTool, SequentialMockProvider, make_text_response};
    use concierge_core::channel::ChannelId;
    use concierge_core::error::ProviderError;
    use concierge_core::event::EventBus;
    use concierge_core::identity::Identity;
    use concierge_core::message::Message;
    use concierge_core::session::SessionStore;
    use concierge_core::tool::ToolRegistry;
    use concierge_session::InMemorySessionStore;

    struct Harness {
        store: Arc<InMemorySessionStore>,
        outbound: Arc<CaptureOutbound>,
        provider: Arc<SequentialMockProvider>,
        runtime: Runtime,
    }

    fn harness_with(provider: SequentialMockProvider) -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let outbound = Arc::new(CaptureOutbound::default());
        let provider = Arc::new(provider);
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoTool { user_facing: false }));
        let agent = Arc::new(AgentLoop::new(
            store.clone(),
            Arc::new(tools),
            outbound.clone(),
            Arc::new(EventBus::default()),
            Arc::new(DefaultAssembler::new(Identity::default())),
        ));
        let runtime = Runtime::new(
            agent,
            Router::new(RouterSettings::default()),
            Bindings::new(provider.clone(), "mock-model"),
            RuntimeSettings::default(),
        );
        Harness {
            store,
            outbound,
            provider,
            runtime,
        }
    }

    fn harness(responses: &[&str]) -> Harness {
        harness_with(SequentialMockProvider::texts(responses))
    }

    fn inbound(content: &str) -> InboundMessage {
        InboundMessage {
            channel_id: ChannelId("cli".into()),
            sender_id: "user".into(),
            chat_id: "local".into(),
            message_id: Some("m1".into()),
            content: content.into(),
            media: Vec::new(),
        }
    }

    #[tokio::test]
    async fn plain_chat_turn() {
        let h = harness(&["Hello there"]);
        let reply = h.runtime.process_message(inbound("hi")).await.unwrap();
        assert_eq!(reply, "Hello there");

        let sent = h.outbound.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_to.as_deref(), Some("m1"));

        let flags = h.store.flags("cli:local").await.unwrap();
        assert_eq!(flags.prev_primary_route, Some(Route::Chat));
        assert_eq!(h.store.history("cli:local").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn route_change_is_declared() {
        let h = harness(&["Restarted."]);
        let reply = h
            .runtime
            .process_message(inbound("please restart the nginx service"))
            .await
            .unwrap();
        assert!(reply.ends_with("\n\nRestarted."));
        assert_ne!(reply, "Restarted.");
        assert_eq!(
            h.store.flags("cli:local").await.unwrap().prev_primary_route,
            Some(Route::Ops)
        );
    }

    #[tokio::test]
    async fn work_overlay_lifecycle() {
        let h = harness(&["one", "two"]);
        let reply = h.runtime.process_message(inbound("/work 2")).await.unwrap();
        assert!(reply.contains('2'));
        assert_eq!(h.provider.call_count(), 0);

        h.runtime.process_message(inbound("hello")).await.unwrap();
        let requests = h.provider.requests();
        let messages = &requests[0].messages;
        let overlay = &messages[messages.len() - 2];
        assert_eq!(overlay.content, RuntimeSettings::default().overlay_directive);
        assert_eq!(h.store.flags("cli:local").await.unwrap().work_overlay_turns_left, 1);

        h.runtime.process_message(inbound("again")).await.unwrap();
        let flags = h.store.flags("cli:local").await.unwrap();
        assert_eq!(flags.work_overlay_turns_left, 0);
        assert!(flags.work_overlay_directive.is_none());

        let status = h.runtime.process_message(inbound("/work status")).await.unwrap();
        assert_eq!(status, "Work mode is off.");
    }

    #[tokio::test]
    async fn malformed_work_gets_usage() {
        let h = harness(&[]);
        let reply = h.runtime.process_message(inbound("/work 0")).await.unwrap();
        assert_eq!(reply, WORK_USAGE);
    }

    #[tokio::test]
    async fn new_session_keeps_flags() {
        let h = harness(&["first"]);
        h.runtime.process_message(inbound("/local")).await.unwrap();
        h.store.add_message("cli:local", Message::user("old")).await.unwrap();

        h.runtime.process_message(inbound("/new")).await.unwrap();
        assert!(h.store.history("cli:local").await.unwrap().is_empty());
        assert!(h.store.flags("cli:local").await.unwrap().local_only);
    }

    #[tokio::test]
    async fn empty_route_command_switches_without_loop() {
        let h = harness(&[]);
        let reply = h.runtime.process_message(inbound("/plan")).await.unwrap();
        assert!(reply.starts_with("Switched to"));
        assert_eq!(h.provider.call_count(), 0);
        assert_eq!(
            h.store.flags("cli:local").await.unwrap().prev_primary_route,
            Some(Route::Plan)
        );
    }

    #[tokio::test]
    async fn delegation_replies_to_origin_and_clears_flags() {
        let h = harness(&["DELEGATE: RESEARCH\nTASK:\nfind the prices", "worker result", "final answer"]);
        let reply = h.runtime.process_message(inbound("how much is it")).await.unwrap();
        assert!(reply.ends_with("final answer"));
        assert_eq!(h.provider.call_count(), 3);

        let sent = h.outbound.sent.lock().unwrap().clone();
        let last = sent.last().unwrap();
        assert_eq!(last.content, reply);
        assert_eq!(last.reply_to.as_deref(), Some("m1"));

        let flags = h.store.flags("cli:local").await.unwrap();
        assert!(!flags.pending_origin_reply);
        assert!(flags.origin_message_id.is_none());
        assert_eq!(flags.prev_primary_route, Some(Route::Chat));
    }

    #[tokio::test]
    async fn failed_delegation_clears_pending_origin() {
        let h = harness_with(SequentialMockProvider::scripted(vec![
            Ok(make_text_response("DELEGATE: RESEARCH\nTASK:\nfind the prices")),
            Err(ProviderError::AuthenticationFailed("bad key".into())),
        ]));
        let err = h.runtime.process_message(inbound("how much is it")).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::AuthenticationFailed(_))));

        let flags = h.store.flags("cli:local").await.unwrap();
        assert!(!flags.pending_origin_reply);
        assert!(flags.origin_message_id.is_none());
        assert!(flags.origin_route.is_none());
    }

    #[tokio::test]
    async fn new_with_text_keeps_history() {
        let h = harness(&["noted"]);
        h.runtime.process_message(inbound("remember the milk")).await.unwrap();
        let reply = h
            .runtime
            .process_message(inbound("/new idea: remind me tomorrow"))
            .await
            .unwrap();
        assert_eq!(reply, NEW_USAGE);
        assert_eq!(h.store.history("cli:local").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn serve_apologizes_on_failure() {
        let h = harness_with(SequentialMockProvider::scripted(vec![Err(ProviderError::AuthenticationFailed(
            "bad key".into(),
        ))]));
        let (tx, rx) = mpsc::channel(4);
        tx.send(inbound("hi")).await.unwrap();
        drop(tx);
        h.runtime.serve(rx).await;
        assert_eq!(h.outbound.contents(), vec![APOLOGY_MESSAGE.to_string()]);
    }
}
