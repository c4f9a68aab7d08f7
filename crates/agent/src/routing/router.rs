//! The routing decision procedure.
//!
//! Tiers, first match wins:
//!
//! 1. **Command** — `/chat`, `/plan`, … `/code3`, `/local`, `/cloud`
//! 2. **Rules** — deterministic pattern/keyword evidence
//! 3. **Classifier** — a model's answer, trusted above a confidence floor
//!    (higher for coder routes, which also need strong code evidence)
//! 4. **Fallback** — the configured route
//!
//! Coder routes are never chosen for a local-only session.

use super::classifier::{ClassifierError, Classify};
use super::rules::{self, has_strong_code_evidence};
use concierge_config::RoutingConfig;
use concierge_core::route::Route;
use concierge_core::session::SessionFlags;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LOCAL_ONLY_BLOCKS_CODE: &str = "local_only_blocks_code";
pub const CLASSIFIER_CODE_WITHOUT_EVIDENCE: &str = "classifier_code_without_strong_evidence";
pub const CLASSIFIER_INVALID_OUTPUT: &str = "classifier_invalid_output";
pub const CLASSIFIER_LOW_CONFIDENCE: &str = "classifier_low_confidence";
pub const CLASSIFIER_ERROR: &str = "classifier_error";

const LOCAL_ONLY_CODE_REPLY: &str =
    "Local-only mode is on, so the coder roles are unavailable. Send /cloud to allow them again.";

/// Which tier settled the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteSource {
    Command,
    Rules,
    Classifier,
    Fallback,
}

impl RouteSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteSource::Command => "command",
            RouteSource::Rules => "rules",
            RouteSource::Classifier => "classifier",
            RouteSource::Fallback => "fallback",
        }
    }
}

/// The router's full answer for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub route: Route,
    pub source: RouteSource,
    pub confidence: f64,
    pub reason: String,
    pub evidence: Vec<String>,
    /// Local-only state the session should have after this turn
    pub local_only: bool,
    pub prev_route: Option<Route>,
    /// User text with any routing command stripped
    pub clean_user_text: String,
    /// Role-switch announcement to prepend to the answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration: Option<String>,
    /// When set, the router answered the turn itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl RoutingDecision {
    fn new(route: Route, source: RouteSource, confidence: f64, flags: &SessionFlags, text: &str) -> Self {
        Self {
            route,
            source,
            confidence,
            reason: String::new(),
            evidence: Vec::new(),
            local_only: flags.local_only,
            prev_route: flags.prev_primary_route,
            clean_user_text: text.trim().to_string(),
            declaration: None,
            direct_response: None,
            error_reason: None,
        }
    }

    fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    fn with_error(mut self, error_reason: Option<&str>) -> Self {
        self.error_reason = error_reason.map(String::from);
        self
    }

    fn direct(mut self, reply: impl Into<String>) -> Self {
        self.direct_response = Some(reply.into());
        self
    }

    /// Whether the router answered the turn itself.
    pub fn is_direct(&self) -> bool {
        self.direct_response.is_some()
    }
}

/// Thresholds and tier switches.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub rules_enabled: bool,
    pub min_confidence: f64,
    pub min_confidence_for_code: f64,
    pub fallback: Route,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            rules_enabled: true,
            min_confidence: 0.6,
            min_confidence_for_code: 0.8,
            fallback: Route::Chat,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &RoutingConfig) -> Self {
        let fallback = config.fallback_route.parse().unwrap_or_else(|_| {
            warn!(fallback = %config.fallback_route, "Invalid fallback route, using CHAT");
            Route::Chat
        });
        Self {
            rules_enabled: config.rules_enabled,
            min_confidence: config.min_confidence,
            min_confidence_for_code: config.min_confidence_for_code,
            fallback,
        }
    }
}

/// Decides which route handles a turn.
pub struct Router {
    settings: RouterSettings,
    classifier: Option<Arc<dyn Classify>>,
}

impl Router {
    pub fn new(settings: RouterSettings) -> Self {
        Self {
            settings,
            classifier: None,
        }
    }

    /// Enable the classifier tier.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classify>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Decide the route for `text` given the session's flags.
    pub async fn decide(&self, text: &str, flags: &SessionFlags) -> RoutingDecision {
        let mut decision = match self.command_tier(text, flags) {
            Some(decision) => decision,
            None => self.content_tiers(text, flags).await,
        };

        if !decision.is_direct() && decision.prev_route != Some(decision.route) {
            decision.declaration = declaration_for(decision.route).map(String::from);
        }

        debug!(
            route = %decision.route,
            source = decision.source.as_str(),
            confidence = decision.confidence,
            error_reason = decision.error_reason.as_deref().unwrap_or(""),
            "Routing decision"
        );
        decision
    }

    fn command_tier(&self, text: &str, flags: &SessionFlags) -> Option<RoutingDecision> {
        let trimmed = text.trim_start();
        let head = trimmed.split_whitespace().next()?;
        let name = head.strip_prefix('/')?.to_lowercase();
        let remainder = trimmed[head.len()..].trim();
        let stay = flags.prev_primary_route.unwrap_or(Route::Chat);

        match name.as_str() {
            "local" => {
                let mut d = RoutingDecision::new(stay, RouteSource::Command, 1.0, flags, remainder)
                    .because("local-only mode on")
                    .direct("Local-only mode on. Only local models will be used and the coder roles are off.");
                d.local_only = true;
                return Some(d);
            }
            "cloud" => {
                let mut d = RoutingDecision::new(stay, RouteSource::Command, 1.0, flags, remainder)
                    .because("local-only mode off")
                    .direct("Local-only mode off. Cloud models are available again.");
                d.local_only = false;
                return Some(d);
            }
            _ => {}
        }

        // Unknown slash tokens fall through to the content tiers.
        let route = name.parse::<Route>().ok()?;
        let base = RoutingDecision::new(route, RouteSource::Command, 1.0, flags, remainder)
            .because(format!("explicit {head} command"));

        if route.is_coder() && flags.local_only {
            return Some(RoutingDecision {
                route: stay,
                ..base
            }
            .with_error(Some(LOCAL_ONLY_BLOCKS_CODE))
            .direct(LOCAL_ONLY_CODE_REPLY));
        }

        if remainder.is_empty() {
            return Some(base.direct(format!("Switched to the {}.", route.role_name())));
        }
        Some(base)
    }

    async fn content_tiers(&self, text: &str, flags: &SessionFlags) -> RoutingDecision {
        if self.settings.rules_enabled {
            if let Some(m) = rules::evaluate(text) {
                let mut d = RoutingDecision::new(m.route, RouteSource::Rules, 1.0, flags, text).because(m.reason);
                d.evidence = m.evidence;
                if d.route.is_coder() && flags.local_only {
                    d.route = Route::Chat;
                    d.error_reason = Some(LOCAL_ONLY_BLOCKS_CODE.into());
                }
                return d;
            }
        }

        let mut fallthrough = None;
        if let Some(classifier) = &self.classifier {
            match classifier.classify(text).await {
                Ok(c) => {
                    let floor = if c.route.is_coder() {
                        self.settings.min_confidence_for_code
                    } else {
                        self.settings.min_confidence
                    };
                    if c.confidence >= floor {
                        let mut d = RoutingDecision::new(c.route, RouteSource::Classifier, c.confidence, flags, text)
                            .because(c.reason);
                        d.evidence = c.evidence;
                        if d.route.is_coder() {
                            if !has_strong_code_evidence(text) {
                                d.route = Route::Chat;
                                d.error_reason = Some(CLASSIFIER_CODE_WITHOUT_EVIDENCE.into());
                            } else if flags.local_only {
                                d.route = Route::Chat;
                                d.error_reason = Some(LOCAL_ONLY_BLOCKS_CODE.into());
                            }
                        }
                        return d;
                    }
                    fallthrough = Some(CLASSIFIER_LOW_CONFIDENCE);
                }
                Err(ClassifierError::InvalidOutput(e)) => {
                    warn!(error = %e, "Classifier output rejected");
                    fallthrough = Some(CLASSIFIER_INVALID_OUTPUT);
                }
                Err(ClassifierError::Backend(e)) => {
                    warn!(error = %e, "Classifier call failed");
                    fallthrough = Some(CLASSIFIER_ERROR);
                }
            }
        }

        RoutingDecision::new(self.settings.fallback, RouteSource::Fallback, 0.0, flags, text)
            .because("no command, rule, or confident classification")
            .with_error(fallthrough)
    }
}

/// The "I will …" phrase announcing a switch to `route`.
pub fn declaration_for(route: Route) -> Option<&'static str> {
    match route {
        Route::Chat => None,
        Route::Plan => Some("I'll put together a plan for this."),
        Route::Analyze => Some("I'll analyze this."),
        Route::Ops => Some("I'll handle this as an operations task."),
        Route::Research => Some("I'll research this."),
        Route::Code | Route::Code1 => Some("I'll work on the code."),
        Route::Code2 => Some("I'll take a design-first pass at the code."),
        Route::Code3 => Some("I'll treat this as critical code work."),
    }
}
