//! Configuration loading, validation, and management for Concierge.
//!
//! Loads configuration from `~/.concierge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use concierge_core::Route;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.concierge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Execution loop budgets and summarization thresholds
    #[serde(default)]
    pub agent: AgentSettings,

    /// Routing tiers and per-route model bindings
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Daily session cutover
    #[serde(default)]
    pub cutover: CutoverConfig,

    /// Work overlay defaults
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Session and journal storage
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Identity configuration
    #[serde(default)]
    pub identity: IdentityConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("routing", &self.routing)
            .field("cutover", &self.cutover)
            .field("overlay", &self.overlay)
            .field("sessions", &self.sessions)
            .field("tools", &self.tools)
            .field("providers", &self.providers)
            .field("identity", &self.identity)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Budgets for the execution loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum model round-trips per turn
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,

    /// Wall-clock budget per turn in milliseconds
    #[serde(default = "default_max_millis")]
    pub max_millis: u64,

    /// Context window of the bound models, in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Round-trip cap for a delegated sub-turn
    #[serde(default = "default_max_loops")]
    pub delegation_max_loops: u32,

    /// Wall-clock budget for a delegated sub-turn in milliseconds
    #[serde(default = "default_delegation_max_millis")]
    pub delegation_max_millis: u64,

    /// Summarize once history holds more than this many messages
    #[serde(default = "default_summarize_threshold")]
    pub summarize_message_threshold: usize,

    /// Summarize once estimated tokens exceed this percent of the window
    #[serde(default = "default_summarize_percent")]
    pub summarize_token_percent: u8,
}

fn default_max_loops() -> u32 {
    20
}
fn default_max_millis() -> u64 {
    300_000
}
fn default_context_window() -> usize {
    128_000
}
fn default_delegation_max_millis() -> u64 {
    600_000
}
fn default_summarize_threshold() -> usize {
    20
}
fn default_summarize_percent() -> u8 {
    75
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            max_millis: default_max_millis(),
            context_window: default_context_window(),
            delegation_max_loops: default_max_loops(),
            delegation_max_millis: default_delegation_max_millis(),
            summarize_message_threshold: default_summarize_threshold(),
            summarize_token_percent: default_summarize_percent(),
        }
    }
}

/// Router tiers and model bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Run the keyword/pattern tier before the classifier
    #[serde(default = "default_true")]
    pub rules_enabled: bool,

    /// Ask a model to classify turns no command or rule settles
    #[serde(default)]
    pub classifier_enabled: bool,

    /// Provider for classification (default provider when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_provider: Option<String>,

    /// Model for classification (default model when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_model: Option<String>,

    /// Minimum classifier confidence for non-coder routes
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Minimum classifier confidence for coder routes
    #[serde(default = "default_min_confidence_for_code")]
    pub min_confidence_for_code: f64,

    /// Route used when nothing else decides. Unknown names mean CHAT.
    #[serde(default = "default_fallback_route")]
    pub fallback_route: String,

    /// Per-route provider/model, keyed by route name
    #[serde(default)]
    pub bindings: HashMap<String, BindingConfig>,

    /// Binding every route uses while a session is local-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<BindingConfig>,
}

fn default_min_confidence() -> f64 {
    0.6
}
fn default_min_confidence_for_code() -> f64 {
    0.8
}
fn default_fallback_route() -> String {
    "CHAT".into()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rules_enabled: true,
            classifier_enabled: false,
            classifier_provider: None,
            classifier_model: None,
            min_confidence: default_min_confidence(),
            min_confidence_for_code: default_min_confidence_for_code(),
            fallback_route: default_fallback_route(),
            bindings: HashMap::new(),
            local: None,
        }
    }
}

/// A provider/model pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Provider name (must be registered, or the default provider is used)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model name
    pub model: String,
}

/// Daily archival boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutoverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local hour at which a new logical day starts
    #[serde(default = "default_cutover_hour")]
    pub hour: u32,

    /// Fixed timezone as minutes east of UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// How many recent history lines go into the archived note
    #[serde(default = "default_archive_lines")]
    pub archive_lines: usize,

    /// Each archived line is cut to this many characters
    #[serde(default = "default_archive_line_chars")]
    pub archive_line_chars: usize,
}

fn default_cutover_hour() -> u32 {
    4
}
fn default_archive_lines() -> usize {
    20
}
fn default_archive_line_chars() -> usize {
    200
}

impl Default for CutoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: default_cutover_hour(),
            utc_offset_minutes: 0,
            archive_lines: default_archive_lines(),
            archive_line_chars: default_archive_line_chars(),
        }
    }
}

/// Defaults for `/work`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_overlay_turns")]
    pub default_turns: u32,

    #[serde(default = "default_overlay_directive")]
    pub directive: String,
}

fn default_overlay_turns() -> u32 {
    8
}
fn default_overlay_directive() -> String {
    "Work mode is on: keep answers short and task-focused, lead with the result, \
     and end with concrete next actions."
        .into()
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            default_turns: default_overlay_turns(),
            directive: default_overlay_directive(),
        }
    }
}

/// Where sessions and the journal live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// "file" or "memory"
    #[serde(default = "default_session_backend")]
    pub backend: String,

    /// Directory for file-backed sessions (default `~/.concierge/sessions`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Journal file (default `~/.concierge/journal.jsonl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
}

fn default_session_backend() -> String {
    "file".into()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            dir: None,
            journal_path: None,
        }
    }
}

impl SessionsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }

    pub fn resolved_journal_path(&self) -> PathBuf {
        self.journal_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("journal.jsonl"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Confine file tools and the shell's working directory to the workspace
    #[serde(default = "default_true")]
    pub workspace_only: bool,

    /// Shell commands the model may run. Empty = all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "head", "tail", "grep", "find", "wc", "git", "cargo", "echo", "pwd", "date"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_shell_timeout() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_only: true,
            allowed_commands: default_allowed_commands(),
            shell_timeout_secs: default_shell_timeout(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Override the system prompt entirely (skips file loading)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    /// Additional context files to load (absolute paths)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_context_files: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.concierge/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `CONCIERGE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("CONCIERGE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("CONCIERGE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("CONCIERGE_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".concierge")
    }

    /// Get the workspace directory path (identity files, tool sandbox).
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        for (name, value) in [
            ("routing.min_confidence", self.routing.min_confidence),
            ("routing.min_confidence_for_code", self.routing.min_confidence_for_code),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 1.0"
                )));
            }
        }

        for route in self.routing.bindings.keys() {
            if route.parse::<Route>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "routing.bindings has unknown route '{route}'"
                )));
            }
        }

        if self.agent.max_loops == 0 || self.agent.delegation_max_loops == 0 {
            return Err(ConfigError::ValidationError(
                "agent loop caps must be at least 1".into(),
            ));
        }

        if self.agent.summarize_token_percent == 0 || self.agent.summarize_token_percent > 100 {
            return Err(ConfigError::ValidationError(
                "agent.summarize_token_percent must be in 1..=100".into(),
            ));
        }

        if self.cutover.hour >= 24 {
            return Err(ConfigError::ValidationError(
                "cutover.hour must be below 24".into(),
            ));
        }

        if self.cutover.utc_offset_minutes.abs() > 14 * 60 {
            return Err(ConfigError::ValidationError(
                "cutover.utc_offset_minutes must be within +/-14h".into(),
            ));
        }

        if !matches!(self.sessions.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "sessions.backend must be \"file\" or \"memory\", got '{}'",
                self.sessions.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            routing: RoutingConfig::default(),
            cutover: CutoverConfig::default(),
            overlay: OverlayConfig::default(),
            sessions: SessionsConfig::default(),
            tools: ToolsConfig::default(),
            providers: HashMap::new(),
            identity: IdentityConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
