//! The agentic execution loop.
//!
//! One turn, bound to one route's provider and model:
//!
//! 1. **Build** the prompt (system + summary + history + overlay + user)
//! 2. **Call** the backend with the route's tool set (empty for CHAT)
//! 3. **If tool calls**: execute them in order, append results, go to 2
//! 4. **If text**: that is the answer
//!
//! The turn ends on a plain answer, after `max_loops` round-trips, or when
//! `max_millis` elapses. A context overflow compresses the stored history
//! and retries the call, at most twice.

use crate::binding::Binding;
use crate::context::assembler::{AssemblyInput, ContextAssembler, format_user_content};
use crate::context::compression::compress_session;
use crate::context::summarizer::Summarizer;
use chrono::Utc;
use concierge_core::channel::{Outbound, OutboundMessage};
use concierge_core::error::Error;
use concierge_core::event::{DomainEvent, EventBus};
use concierge_core::message::{Message, MessageToolCall};
use concierge_core::provider::{ProviderRequest, ProviderResponse, ToolDefinition};
use concierge_core::session::SessionStore;
use concierge_core::tool::{ToolCall, ToolRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extra attempts after a context overflow.
pub const MAX_OVERFLOW_RETRIES: u32 = 2;

pub const COMPRESSION_NOTICE: &str =
    "This conversation got too long for the model, so I'm compressing older history and trying again.";

pub const TIMEOUT_MESSAGE: &str =
    "Sorry, I ran out of time on this one and stopped early. Send \"continue\" and I'll pick up where I left off.";

/// Stored as the result of a tool call the turn budget cut off.
pub const INTERRUPTED_TOOL_RESULT: &str = "Error: stopped, the turn's time budget elapsed before this tool finished.";

pub const MAX_LOOPS_MESSAGE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// Per-invocation settings. Built fresh for every turn, nested ones included.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub session_key: String,
    pub channel: String,
    pub chat_id: String,
    pub user_text: String,
    /// Media references attached to the user message
    pub media: Vec<String>,
    /// Cap on backend round-trips
    pub max_loops: u32,
    /// Wall-clock budget in milliseconds
    pub max_millis: u64,
    /// Include stored history and summary in the prompt
    pub load_history: bool,
    /// Consider background summarization once the turn ends
    pub trigger_summary: bool,
    /// Publish the final answer to the channel
    pub publish_response: bool,
    /// Work-overlay directive to inject before the user message
    pub overlay: Option<String>,
    /// Message the published answer replies to
    pub reply_to: Option<String>,
}

impl ProcessOptions {
    pub fn new(
        session_key: impl Into<String>,
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            session_key: session_key.into(),
            channel: channel.into(),
            chat_id: chat_id.into(),
            user_text: user_text.into(),
            media: Vec::new(),
            max_loops: 20,
            max_millis: 300_000,
            load_history: true,
            trigger_summary: true,
            publish_response: false,
            overlay: None,
            reply_to: None,
        }
    }

    pub fn with_budget(mut self, max_loops: u32, max_millis: u64) -> Self {
        self.max_loops = max_loops;
        self.max_millis = max_millis;
        self
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    MaxLoops,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub content: String,
    pub status: TurnStatus,
    /// Backend round-trips made
    pub iterations: u32,
}

/// Drives turns against a bound backend.
pub struct AgentLoop {
    sessions: Arc<dyn SessionStore>,
    tools: Arc<ToolRegistry>,
    outbound: Arc<dyn Outbound>,
    events: Arc<EventBus>,
    assembler: Arc<dyn ContextAssembler>,
    summarizer: Option<Summarizer>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl AgentLoop {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        tools: Arc<ToolRegistry>,
        outbound: Arc<dyn Outbound>,
        events: Arc<EventBus>,
        assembler: Arc<dyn ContextAssembler>,
    ) -> Self {
        Self {
            sessions,
            tools,
            outbound,
            events,
            assembler,
            summarizer: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Attach a background summarizer.
    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Run one turn.
    ///
    /// Running out of time is an outcome, not an error: the apology is
    /// stored and returned as the answer. Backend failures other than a
    /// recoverable overflow are returned as errors.
    pub async fn process(&self, binding: &Binding, opts: ProcessOptions) -> Result<TurnOutcome, Error> {
        info!(
            session = %opts.session_key,
            route = %binding.route,
            model = %binding.model,
            "Processing turn"
        );

        let mut iterations = 0u32;
        let mut open_calls = Vec::new();
        let budget = Duration::from_millis(opts.max_millis);
        let result = tokio::time::timeout(
            budget,
            self.run(binding, &opts, &mut iterations, &mut open_calls),
        )
        .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(Error::Provider(e))) if e.is_timeout() => {
                warn!(session = %opts.session_key, error = %e, "Backend timed out");
                self.stop_early(&opts, iterations, &open_calls).await?
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(session = %opts.session_key, budget_ms = opts.max_millis, "Turn budget elapsed");
                self.stop_early(&opts, iterations, &open_calls).await?
            }
        };

        if opts.publish_response {
            self.notify(&opts, &outcome.content, opts.reply_to.clone()).await;
        }

        if opts.trigger_summary {
            if let Some(summarizer) = &self.summarizer {
                summarizer.maybe_spawn(&opts.session_key, binding).await;
            }
        }

        Ok(outcome)
    }

    /// `open_calls` holds the ids of stored tool calls that have no stored
    /// result yet, so an interrupted turn can close them.
    async fn run(
        &self,
        binding: &Binding,
        opts: &ProcessOptions,
        iterations: &mut u32,
        open_calls: &mut Vec<String>,
    ) -> Result<TurnOutcome, Error> {
        let key = opts.session_key.as_str();
        let (history, summary) = if opts.load_history {
            (self.sessions.history(key).await?, self.sessions.summary(key).await?)
        } else {
            (Vec::new(), String::new())
        };

        let user = Message::user(format_user_content(&opts.user_text, &opts.media));
        self.sessions.add_message(key, user.clone()).await?;

        let tools = if binding.route.allows_tools() {
            self.tools.definitions()
        } else {
            Vec::new()
        };

        let mut messages = self.assembler.assemble(&AssemblyInput {
            route: binding.route,
            summary: &summary,
            history: &history,
            overlay: opts.overlay.as_deref(),
            user: Some(&user),
        });

        loop {
            if *iterations >= opts.max_loops {
                warn!(session = %key, iterations = *iterations, "Max tool iterations reached");
                self.sessions.add_message(key, Message::assistant(MAX_LOOPS_MESSAGE)).await?;
                return Ok(TurnOutcome {
                    content: MAX_LOOPS_MESSAGE.into(),
                    status: TurnStatus::MaxLoops,
                    iterations: *iterations,
                });
            }
            *iterations += 1;
            debug!(session = %key, iteration = *iterations, "Agent loop iteration");

            let response = self
                .call_with_recovery(binding, opts, &tools, &summary, &user.id, &mut messages)
                .await?;

            if let Some(usage) = &response.usage {
                self.events.publish(DomainEvent::ResponseGenerated {
                    session: key.to_string(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            let reply = response.message;
            if reply.tool_calls.is_empty() || tools.is_empty() {
                if !reply.tool_calls.is_empty() {
                    warn!(
                        session = %key,
                        route = %binding.route,
                        count = reply.tool_calls.len(),
                        "Ignoring tool calls from a route without tools"
                    );
                }
                let content = reply.content;
                self.sessions.add_message(key, Message::assistant(content.clone())).await?;
                return Ok(TurnOutcome {
                    content,
                    status: TurnStatus::Completed,
                    iterations: *iterations,
                });
            }

            debug!(session = %key, tool_count = reply.tool_calls.len(), "Executing tool calls");
            let assistant = Message::assistant_with_tool_calls(reply.content, reply.tool_calls.clone());
            *open_calls = reply.tool_calls.iter().map(|tc| tc.id.clone()).collect();
            self.sessions.add_message(key, assistant.clone()).await?;
            messages.push(assistant);

            for tc in &reply.tool_calls {
                let output = self.execute_tool(opts, tc).await;
                let result = Message::tool_result(&tc.id, output);
                self.sessions.add_message(key, result.clone()).await?;
                messages.push(result);
                open_calls.retain(|id| id != &tc.id);
            }
        }
    }

    /// One backend call, retried after compressing history when the backend
    /// reports a context overflow.
    async fn call_with_recovery(
        &self,
        binding: &Binding,
        opts: &ProcessOptions,
        tools: &[ToolDefinition],
        summary: &str,
        user_id: &str,
        messages: &mut Vec<Message>,
    ) -> Result<ProviderResponse, Error> {
        let key = opts.session_key.as_str();
        let mut retries = 0;

        loop {
            let request = ProviderRequest {
                model: binding.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tools.to_vec(),
            };

            match binding.provider.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_context_overflow() && retries < MAX_OVERFLOW_RETRIES => {
                    retries += 1;
                    warn!(session = %key, retry = retries, error = %e, "Context overflow, compressing history");
                    if retries == 1 {
                        self.notify(opts, COMPRESSION_NOTICE, None).await;
                    }

                    compress_session(self.sessions.as_ref(), &self.events, key).await?;

                    // Rebuild from what is stored so this turn's own
                    // transcript is not sent twice. The overlay goes back in
                    // ahead of this turn's user message.
                    let history = self.sessions.history(key).await?;
                    let split = history.iter().position(|m| m.id == user_id).unwrap_or(history.len());
                    let (earlier, current) = history.split_at(split);
                    *messages = self.assembler.assemble(&AssemblyInput {
                        route: binding.route,
                        summary,
                        history: earlier,
                        overlay: opts.overlay.as_deref(),
                        user: current.first(),
                    });
                    messages.extend(current.iter().skip(1).cloned());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Execute one tool call. Failures are reported to the model as text.
    async fn execute_tool(&self, opts: &ProcessOptions, tc: &MessageToolCall) -> String {
        let start = Instant::now();
        let result = match ToolCall::from_message(tc) {
            Ok(call) => self.tools.execute(&call).await,
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (output, success) = match result {
            Ok(result) => {
                if result.user_facing {
                    self.notify(opts, &result.output, None).await;
                }
                (result.output, result.success)
            }
            Err(e) => {
                warn!(session = %opts.session_key, tool = %tc.name, error = %e, "Tool execution failed");
                (format!("Error: {e}"), false)
            }
        };

        self.events.publish(DomainEvent::ToolExecuted {
            session: opts.session_key.clone(),
            tool_name: tc.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        output
    }

    async fn stop_early(&self, opts: &ProcessOptions, iterations: u32, open_calls: &[String]) -> Result<TurnOutcome, Error> {
        for id in open_calls {
            self.sessions
                .add_message(&opts.session_key, Message::tool_result(id, INTERRUPTED_TOOL_RESULT))
                .await?;
        }
        self.sessions
            .add_message(&opts.session_key, Message::assistant(TIMEOUT_MESSAGE))
            .await?;
        Ok(TurnOutcome {
            content: TIMEOUT_MESSAGE.into(),
            status: TurnStatus::TimedOut,
            iterations,
        })
    }

    async fn notify(&self, opts: &ProcessOptions, content: &str, reply_to: Option<String>) {
        self.publish(&opts.channel, &opts.chat_id, content, reply_to).await;
    }

    /// Publish text to a chat. Delivery failures are logged only.
    pub async fn publish(&self, channel: &str, chat_id: &str, content: &str, reply_to: Option<String>) {
        let message = OutboundMessage::new(channel, chat_id, content).replying_to(reply_to);
        if let Err(e) = self.outbound.publish(message).await {
            warn!(channel = %channel, error = %e, "Failed to publish message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assembler::DefaultAssembler;
    use crate::context::compression::compression_note;
    use crate::test_helpers::{
        CaptureOutbound, EchoTool, SequentialMockProvider, make_text_response, make_tool_call,
        make_tool_call_response,
    };
    use async_trait::async_trait;
    use concierge_core::error::{ProviderError, ToolError};
    use concierge_core::identity::Identity;
    use concierge_core::message::Role;
    use concierge_core::provider::Provider;
    use concierge_core::route::Route;
    use concierge_core::tool::{Tool, ToolResult};
    use concierge_session::InMemorySessionStore;

    struct Harness {
        store: Arc<InMemorySessionStore>,
        outbound: Arc<CaptureOutbound>,
        agent: AgentLoop,
    }

    fn harness(user_facing: bool) -> Harness {
        harness_with(Box::new(EchoTool { user_facing }))
    }

    fn harness_with(tool: Box<dyn Tool>) -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let outbound = Arc::new(CaptureOutbound::default());
        let mut tools = ToolRegistry::new();
        tools.register(tool);
        let agent = AgentLoop::new(
            store.clone(),
            Arc::new(tools),
            outbound.clone(),
            Arc::new(EventBus::default()),
            Arc::new(DefaultAssembler::new(Identity::default())),
        );
        Harness { store, outbound, agent }
    }

    fn bind(route: Route, provider: Arc<dyn Provider>) -> Binding {
        Binding {
            route,
            provider,
            model: "mock-model".into(),
        }
    }

    fn opts(text: &str) -> ProcessOptions {
        ProcessOptions::new("cli:local", "cli", "local", text)
    }

    #[tokio::test]
    async fn simple_text_response() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::texts(&["Hello! How can I help?"]));

        let outcome = h.agent.process(&bind(Route::Chat, provider), opts("Hello!")).await.unwrap();
        assert_eq!(outcome.content, "Hello! How can I help?");
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.iterations, 1);

        let history = h.store.history("cli:local").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert!(h.outbound.contents().is_empty());
    }

    #[tokio::test]
    async fn tool_round_trip_on_working_route() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "pong"}))], ""),
            make_text_response("done"),
        ]));

        let outcome = h
            .agent
            .process(&bind(Route::Ops, provider.clone()), opts("ping it"))
            .await
            .unwrap();
        assert_eq!(outcome.content, "done");
        assert_eq!(outcome.iterations, 2);

        let requests = provider.requests();
        assert!(requests.iter().all(|r| !r.tools.is_empty()));
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, "pong");

        // user, assistant(tool call), tool, assistant
        assert_eq!(h.store.history("cli:local").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn chat_route_gets_no_tools_and_ignores_tool_calls() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("echo", serde_json::json!({"text": "sneaky"}))],
            "just chatting",
        )]));

        let outcome = h
            .agent
            .process(&bind(Route::Chat, provider.clone()), opts("hi"))
            .await
            .unwrap();
        assert_eq!(outcome.content, "just chatting");
        assert_eq!(provider.call_count(), 1);
        assert!(provider.requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn user_facing_results_are_published() {
        let h = harness(true);
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "halfway"}))], ""),
            make_text_response("finished"),
        ]));

        h.agent
            .process(&bind(Route::Research, provider), opts("go"))
            .await
            .unwrap();
        assert_eq!(h.outbound.contents(), vec!["halfway".to_string()]);
    }

    #[tokio::test]
    async fn publish_response_replies_to_origin() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::texts(&["answer"]));
        let mut o = opts("q");
        o.publish_response = true;
        o.reply_to = Some("m1".into());

        h.agent.process(&bind(Route::Chat, provider), o).await.unwrap();
        let sent = h.outbound.sent.lock().unwrap();
        assert_eq!(sent[0].content, "answer");
        assert_eq!(sent[0].reply_to.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_model() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("nope", serde_json::json!({}))], ""),
            make_text_response("recovered"),
        ]));

        let outcome = h
            .agent
            .process(&bind(Route::Ops, provider.clone()), opts("x"))
            .await
            .unwrap();
        assert_eq!(outcome.content, "recovered");
        let tool_msg = provider.requests()[1].messages.last().unwrap().clone();
        assert!(tool_msg.content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn max_loops_ends_the_turn() {
        let h = harness(false);
        let call = || make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "again"}))], "");
        let provider = Arc::new(SequentialMockProvider::new(vec![call(), call(), call()]));

        let outcome = h
            .agent
            .process(&bind(Route::Ops, provider.clone()), opts("loop").with_budget(3, 60_000))
            .await
            .unwrap();
        assert_eq!(outcome.status, TurnStatus::MaxLoops);
        assert_eq!(outcome.content, MAX_LOOPS_MESSAGE);
        assert_eq!(provider.call_count(), 3);
    }

    async fn seed(store: &InMemorySessionStore, n: usize) {
        for i in 0..n {
            store.add_message("cli:local", Message::user(format!("old {i}"))).await.unwrap();
        }
    }

    #[tokio::test]
    async fn overflow_compresses_and_retries() {
        let h = harness(false);
        seed(&h.store, 10).await;
        let provider = Arc::new(SequentialMockProvider::scripted(vec![
            Err(ProviderError::ContextOverflow("too long".into())),
            Ok(make_text_response("fits now")),
        ]));

        let outcome = h
            .agent
            .process(&bind(Route::Chat, provider.clone()), opts("new question"))
            .await
            .unwrap();
        assert_eq!(outcome.content, "fits now");
        assert_eq!(h.outbound.contents(), vec![COMPRESSION_NOTICE.to_string()]);

        let requests = provider.requests();
        assert!(requests[1].messages.len() < requests[0].messages.len());
        // rebuilt from storage: the user message appears exactly once
        let retried = &requests[1].messages;
        assert_eq!(retried.iter().filter(|m| m.content == "new question").count(), 1);
        assert!(retried.iter().any(|m| m.content == compression_note(5)));
    }

    #[tokio::test]
    async fn legacy_overflow_text_is_recognized() {
        let h = harness(false);
        seed(&h.store, 10).await;
        let provider = Arc::new(SequentialMockProvider::scripted(vec![
            Err(ProviderError::ApiError {
                status_code: 400,
                message: "InvalidParameter: input too long".into(),
            }),
            Ok(make_text_response("ok")),
        ]));
        let outcome = h.agent.process(&bind(Route::Chat, provider), opts("q")).await.unwrap();
        assert_eq!(outcome.content, "ok");
    }

    #[tokio::test]
    async fn overflow_gives_up_after_two_retries() {
        let h = harness(false);
        seed(&h.store, 20).await;
        let overflow = || Err(ProviderError::ContextOverflow("still too long".into()));
        let provider = Arc::new(SequentialMockProvider::scripted(vec![overflow(), overflow(), overflow()]));

        let err = h
            .agent
            .process(&bind(Route::Chat, provider.clone()), opts("q"))
            .await
            .unwrap_err();
        assert!(err.is_context_overflow());
        assert_eq!(provider.call_count(), 3);
        // notice only on the first retry
        assert_eq!(h.outbound.contents().len(), 1);
    }

    #[tokio::test]
    async fn other_backend_errors_abort() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::scripted(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let err = h.agent.process(&bind(Route::Chat, provider.clone()), opts("q")).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::AuthenticationFailed(_))));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn backend_timeout_is_a_soft_outcome() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::scripted(vec![Err(ProviderError::Timeout(
            "deadline".into(),
        ))]));
        let outcome = h.agent.process(&bind(Route::Chat, provider), opts("q")).await.unwrap();
        assert_eq!(outcome.status, TurnStatus::TimedOut);
        assert_eq!(outcome.content, TIMEOUT_MESSAGE);
        let history = h.store.history("cli:local").await.unwrap();
        assert_eq!(history.last().unwrap().content, TIMEOUT_MESSAGE);
    }

    struct SlowProvider;

    #[async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(make_text_response("too late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_budget_is_a_soft_outcome() {
        let h = harness(false);
        let outcome = h
            .agent
            .process(&bind(Route::Chat, Arc::new(SlowProvider)), opts("q").with_budget(5, 1_000))
            .await
            .unwrap();
        assert_eq!(outcome.status, TurnStatus::TimedOut);
        assert_eq!(outcome.iterations, 1);
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Takes a minute"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolResult::silent("finished"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_elapsing_mid_tool_closes_the_call() {
        let h = harness_with(Box::new(SlowTool));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("slow", serde_json::json!({}))], ""),
            make_text_response("picking up"),
        ]));
        let binding = bind(Route::Ops, provider.clone());

        let outcome = h
            .agent
            .process(&binding, opts("run the slow job").with_budget(5, 1_000))
            .await
            .unwrap();
        assert_eq!(outcome.status, TurnStatus::TimedOut);

        let history = h.store.history("cli:local").await.unwrap();
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_slow"));
        assert_eq!(history[2].content, INTERRUPTED_TOOL_RESULT);
        assert_eq!(history[3].content, TIMEOUT_MESSAGE);

        // The next turn sends every stored call together with its result.
        let outcome = h.agent.process(&binding, opts("continue")).await.unwrap();
        assert_eq!(outcome.content, "picking up");
        let sent = &provider.requests()[1].messages;
        for (i, m) in sent.iter().enumerate() {
            for tc in &m.tool_calls {
                assert!(
                    sent[i + 1..]
                        .iter()
                        .any(|r| r.role == Role::Tool && r.tool_call_id.as_deref() == Some(tc.id.as_str())),
                    "call {} has no result",
                    tc.id
                );
            }
        }
    }

    #[tokio::test]
    async fn overflow_retry_keeps_overlay_ahead_of_user() {
        let h = harness(false);
        seed(&h.store, 10).await;
        let provider = Arc::new(SequentialMockProvider::scripted(vec![
            Err(ProviderError::ContextOverflow("too long".into())),
            Ok(make_text_response("fits now")),
        ]));
        let mut o = opts("new question");
        o.overlay = Some("Work mode: stay on task.".into());

        h.agent.process(&bind(Route::Chat, provider.clone()), o).await.unwrap();

        for request in provider.requests() {
            let at = request
                .messages
                .iter()
                .position(|m| m.content == "Work mode: stay on task.")
                .expect("overlay present");
            assert_eq!(request.messages[at].role, Role::System);
            assert_eq!(request.messages[at + 1].content, "new question");
        }
    }

    #[tokio::test]
    async fn fresh_sessions_skip_stored_history() {
        let h = harness(false);
        seed(&h.store, 3).await;
        let provider = Arc::new(SequentialMockProvider::texts(&["ok"]));
        let mut o = opts("only this");
        o.load_history = false;

        h.agent.process(&bind(Route::Chat, provider.clone()), o).await.unwrap();
        // system + user
        assert_eq!(provider.requests()[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn overlay_precedes_user_message() {
        let h = harness(false);
        let provider = Arc::new(SequentialMockProvider::texts(&["ok"]));
        let mut o = opts("task");
        o.overlay = Some("work mode".into());

        h.agent.process(&bind(Route::Chat, provider.clone()), o).await.unwrap();
        let messages = &provider.requests()[0].messages;
        let n = messages.len();
        assert_eq!(messages[n - 2].content, "work mode");
        assert_eq!(messages[n - 1].content, "task");
    }
}
