//! Inter-role delegation.
//!
//! The conversational role hands work to another role with a two-marker
//! text directive; the coordinator runs it in nested loops and folds the
//! result back into one answer.

pub mod coordinator;
pub mod directive;
pub mod notice;

pub use coordinator::{DelegationContext, DelegationCoordinator, DelegationOutcome, DelegationSettings};
pub use directive::{DelegationDirective, is_directive, parse_directive, select_coder};
