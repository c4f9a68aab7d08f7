//! Model-backed route classifier.
//!
//! One bounded prompt, one call, strict JSON back. Anything that does not
//! validate is reported as invalid output; the router falls through.

use async_trait::async_trait;
use concierge_core::error::ProviderError;
use concierge_core::message::Message;
use concierge_core::provider::{Provider, ProviderRequest};
use concierge_core::route::Route;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Longest input sent for classification, in characters.
pub const MAX_INPUT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "\
You classify a user message for a personal assistant. Reply with STRICT JSON ONLY, \
no prose and no markdown, using exactly these keys:
{\"route\": string, \"confidence\": number, \"reason\": string, \"evidence\": [string]}
route must be one of: CHAT, PLAN, ANALYZE, OPS, RESEARCH, CODE, CODE1, CODE2, CODE3.
- CHAT: conversation, quick questions, anything else
- PLAN: designs, specs, roadmaps, step-by-step plans
- ANALYZE: data, tables, numbers, comparisons
- OPS: servers, deployments, system administration
- RESEARCH: finding and citing outside information
- CODE*: writing, fixing, or reviewing source code
confidence is between 0 and 1. evidence lists short quotes from the message.";

/// A validated classifier answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub route: Route,
    pub confidence: f64,
    pub reason: String,
    pub evidence: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier backend failed: {0}")]
    Backend(#[from] ProviderError),

    #[error("classifier returned invalid output: {0}")]
    InvalidOutput(String),
}

/// Anything that can classify a message into a route.
#[async_trait]
pub trait Classify: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError>;
}

/// Classifier that asks a language model.
pub struct LlmClassifier {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    route: String,
    confidence: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    evidence: Vec<String>,
}

#[async_trait]
impl Classify for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let input: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(input)],
            temperature: 0.0,
            max_tokens: Some(200),
            tools: vec![],
        };

        let response = self.provider.complete(request).await?;
        let classification = parse_classification(&response.message.content)?;
        debug!(
            route = %classification.route,
            confidence = classification.confidence,
            "Classifier answered"
        );
        Ok(classification)
    }
}

/// Validate raw classifier output.
pub fn parse_classification(raw: &str) -> Result<Classification, ClassifierError> {
    let payload = strip_fence(raw.trim());
    let parsed: RawClassification = serde_json::from_str(payload)
        .map_err(|e| ClassifierError::InvalidOutput(format!("not a classification object: {e}")))?;

    let route = parsed
        .route
        .parse::<Route>()
        .map_err(|e| ClassifierError::InvalidOutput(e.to_string()))?;

    if !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(ClassifierError::InvalidOutput(format!(
            "confidence {} outside [0, 1]",
            parsed.confidence
        )));
    }

    Ok(Classification {
        route,
        confidence: parsed.confidence,
        reason: parsed.reason,
        evidence: parsed.evidence,
    })
}

/// Remove one surrounding markdown fence, if present.
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop an info string such as `json` on the opening line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.trim_start().starts_with('{') => inner.trim(),
        _ => body.trim(),
    }
}
