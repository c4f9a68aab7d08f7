//! Route selection: commands, rules, classifier, fallback.

pub mod classifier;
pub mod router;
pub mod rules;

pub use classifier::{Classification, ClassifierError, Classify, LlmClassifier};
pub use router::{RouteSource, Router, RouterSettings, RoutingDecision};
pub use rules::has_strong_code_evidence;
