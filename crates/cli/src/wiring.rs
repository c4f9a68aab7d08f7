//! Builds the runtime from configuration.

use concierge_agent::{
    AgentLoop, Bindings, CutoverGate, DefaultAssembler, LlmClassifier, Router, RouterSettings, Runtime,
    RuntimeSettings, Summarizer, SummarizerSettings,
};
use concierge_config::AppConfig;
use concierge_core::channel::Outbound;
use concierge_core::event::EventBus;
use concierge_core::identity::Identity;
use concierge_core::journal::Journal;
use concierge_core::session::SessionStore;
use concierge_providers::router::{ProviderRouter, build_from_config};
use concierge_session::{FileJournal, FileSessionStore, InMemoryJournal, InMemorySessionStore};
use concierge_tools::{RegistryOptions, default_registry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error>;

/// The router for `config`, with the classifier tier when it is enabled.
pub fn build_router(config: &AppConfig, providers: &ProviderRouter) -> Router {
    let router = Router::new(RouterSettings::from_config(&config.routing));
    if !config.routing.classifier_enabled {
        return router;
    }

    let provider = providers.resolve(config.routing.classifier_provider.as_deref());
    match provider {
        Some(provider) => {
            let model = config
                .routing
                .classifier_model
                .clone()
                .unwrap_or_else(|| config.default_model.clone());
            info!(model = %model, "Classifier tier enabled");
            router.with_classifier(Arc::new(LlmClassifier::new(provider, model)))
        }
        None => {
            warn!("Classifier enabled but its provider is not configured; skipping the tier");
            router
        }
    }
}

fn build_storage(config: &AppConfig) -> (Arc<dyn SessionStore>, Arc<dyn Journal>) {
    match config.sessions.backend.as_str() {
        "memory" => (Arc::new(InMemorySessionStore::new()), Arc::new(InMemoryJournal::new())),
        _ => (
            Arc::new(FileSessionStore::new(config.sessions.resolved_dir())),
            Arc::new(FileJournal::new(config.sessions.resolved_journal_path())),
        ),
    }
}

/// Wire stores, tools, bindings, and the loop into a runtime that publishes
/// through `outbound`.
pub fn build_runtime(config: &AppConfig, outbound: Arc<dyn Outbound>) -> Result<Runtime, BoxError> {
    let providers = build_from_config(config);
    let bindings = Bindings::from_config(config, &providers)?;
    let (sessions, journal) = build_storage(config);
    let events = Arc::new(EventBus::default());

    let workspace = AppConfig::workspace_dir();
    let extra_files: Vec<PathBuf> = config.identity.extra_context_files.iter().map(PathBuf::from).collect();
    let identity = Identity::load(
        Some(workspace.as_path()),
        &extra_files,
        config.identity.system_prompt_override.as_deref(),
    );

    let tools = default_registry(RegistryOptions {
        workspace: Some(workspace),
        workspace_only: config.tools.workspace_only,
        allowed_commands: config.tools.allowed_commands.clone(),
        shell_timeout: Duration::from_secs(config.tools.shell_timeout_secs),
    });

    let summarizer = Summarizer::new(
        sessions.clone(),
        events.clone(),
        SummarizerSettings {
            context_window: config.agent.context_window,
            message_threshold: config.agent.summarize_message_threshold,
            token_percent: config.agent.summarize_token_percent,
        },
    );

    let agent = AgentLoop::new(
        sessions.clone(),
        Arc::new(tools),
        outbound,
        events.clone(),
        Arc::new(DefaultAssembler::new(identity)),
    )
    .with_summarizer(summarizer)
    .with_temperature(config.default_temperature)
    .with_max_tokens(config.default_max_tokens);

    let cutover = CutoverGate::new(&config.cutover, sessions, journal, events)?;
    let runtime = Runtime::new(
        Arc::new(agent),
        build_router(config, &providers),
        bindings,
        RuntimeSettings::from_config(config),
    )
    .with_cutover(cutover);
    Ok(runtime)
}
