//! Provider router — holds every configured backend by name.
//!
//! Route bindings name a provider; the router turns that name into a live
//! `Arc<dyn Provider>`. Unknown names resolve to the default provider.

use concierge_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve an optional provider name, falling back to the default.
    pub fn resolve(&self, name: Option<&str>) -> Option<Arc<dyn Provider>> {
        match name {
            Some(name) => self.get(name).or_else(|| {
                warn!(provider = name, "Unknown provider in binding, using default");
                self.default_provider()
            }),
            None => self.default_provider(),
        }
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` entry becomes an OpenAI-compatible backend, as
/// does any provider referenced only by a route binding or the local binding.
pub fn build_from_config(config: &concierge_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key)),
        );
    }

    let referenced = config
        .routing
        .bindings
        .values()
        .chain(config.routing.local.iter())
        .filter_map(|b| b.provider.clone())
        .chain(config.routing.classifier_provider.clone())
        .chain(std::iter::once(config.default_provider.clone()));

    for name in referenced {
        if router.get(&name).is_some() {
            continue;
        }
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&name);
        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(&name, &base_url, &api_key)),
        );
    }

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
