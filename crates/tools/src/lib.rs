//! Built-in tools for Concierge.
//!
//! Tools are only offered to working roles (everything except CHAT):
//! run shell commands, read and write workspace files, and message the
//! user mid-task.

pub mod file_read;
pub mod file_write;
pub mod message;
pub mod scope;
pub mod shell;

use concierge_core::tool::ToolRegistry;
use std::path::PathBuf;
use std::time::Duration;

pub use scope::{ScopeError, WorkspaceScope};

/// Settings for [`default_registry`].
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Workspace root for file tools and the shell's working directory
    pub workspace: Option<PathBuf>,
    /// Refuse file access outside the workspace
    pub workspace_only: bool,
    /// Shell allowlist; empty allows everything
    pub allowed_commands: Vec<String>,
    pub shell_timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            workspace: None,
            workspace_only: true,
            allowed_commands: Vec::new(),
            shell_timeout: Duration::from_secs(60),
        }
    }
}

/// Create a tool registry with all built-in tools.
pub fn default_registry(options: RegistryOptions) -> ToolRegistry {
    let scope = match &options.workspace {
        Some(root) => WorkspaceScope::new(root.clone(), options.workspace_only),
        None => WorkspaceScope::unrestricted(),
    };

    let mut shell = shell::ShellTool::new(options.allowed_commands).with_timeout(options.shell_timeout);
    if let Some(root) = options.workspace {
        shell = shell.with_working_dir(root);
    }

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(shell));
    registry.register(Box::new(file_read::FileReadTool::new(scope.clone())));
    registry.register(Box::new(file_write::FileWriteTool::new(scope)));
    registry.register(Box::new(message::MessageTool));
    registry
}
