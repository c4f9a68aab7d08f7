//! Shared test helpers for agent tests.

use async_trait::async_trait;
use concierge_core::channel::{Outbound, OutboundMessage};
use concierge_core::error::{ChannelError, ProviderError};
use concierge_core::message::{Message, MessageToolCall};
use concierge_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use concierge_core::tool::{Tool, ToolResult};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted results and records
/// every request it receives.
///
/// Panics if more calls are made than results provided.
pub struct SequentialMockProvider {
    name: String,
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn named(name: &str, responses: Vec<ProviderResponse>) -> Self {
        Self {
            name: name.into(),
            ..Self::new(responses)
        }
    }

    /// Script successes and failures in call order.
    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            name: "sequential_mock".into(),
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns the given texts in order.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("SequentialMockProvider: no more responses (call #{call})"))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        finish_reason: Some("stop".into()),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls(thought, tool_calls),
        finish_reason: Some("tool_calls".into()),
        ..make_text_response("")
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// Outbound sink that keeps everything published.
#[derive(Default)]
pub struct CaptureOutbound {
    pub sent: Mutex<Vec<OutboundMessage>>,
}

impl CaptureOutbound {
    pub fn contents(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.content.clone()).collect()
    }
}

#[async_trait]
impl Outbound for CaptureOutbound {
    async fn publish(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Tool that echoes its `text` argument, optionally user-facing.
pub struct EchoTool {
    pub user_facing: bool,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, concierge_core::error::ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default().to_string();
        Ok(if self.user_facing {
            ToolResult::user_facing(text)
        } else {
            ToolResult::silent(text)
        })
    }
}
