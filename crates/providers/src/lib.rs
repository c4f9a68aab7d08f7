//! Language-model backends for Concierge.
//!
//! All providers implement the `concierge_core::Provider` trait.
//! The router resolves a provider by name for each route binding.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
