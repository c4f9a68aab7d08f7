//! The routing decision engine and agentic execution loop.
//!
//! A turn flows through:
//!
//! 1. **Cutover**: yesterday's session is archived and reset
//! 2. **Commands**: `/work`, `/normal`, `/new` answer directly
//! 3. **Routing**: commands, then rules, then the classifier, then a fallback
//! 4. **Loop**: the bound backend is called, tools run, until a plain answer
//! 5. **Delegation**: the conversational role may hand the task to another
//!    role, whose result is turned into the final answer
//!
//! Context pressure is handled in two places: a background summarizer folds
//! old history into a running summary, and a context overflow from the
//! backend forces an emergency compression before retrying.

pub mod binding;
pub mod commands;
pub mod context;
pub mod cutover;
pub mod delegation;
pub mod loop_runner;
pub mod routing;
pub mod runtime;

#[cfg(test)]
mod test_helpers;

pub use binding::{Binding, Bindings};
pub use commands::{SessionCommand, parse_session_command};
pub use context::{ContextAssembler, DefaultAssembler, Summarizer, SummarizerSettings};
pub use cutover::{CutoverGate, CutoverOutcome};
pub use delegation::{DelegationCoordinator, DelegationDirective, DelegationSettings, parse_directive};
pub use loop_runner::{AgentLoop, ProcessOptions, TurnOutcome, TurnStatus};
pub use routing::{Classify, LlmClassifier, RouteSource, Router, RouterSettings, RoutingDecision};
pub use runtime::{Runtime, RuntimeSettings};
