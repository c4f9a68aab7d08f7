//! File read tool — read file contents within the workspace.

use async_trait::async_trait;
use concierge_core::error::ToolError;
use concierge_core::tool::{Tool, ToolResult};
use crate::scope::WorkspaceScope;

pub struct FileReadTool {
    scope: WorkspaceScope,
}

impl FileReadTool {
    pub fn new(scope: WorkspaceScope) -> Self {
        Self { scope }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new(WorkspaceScope::unrestricted())
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Relative paths resolve inside the workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = self.scope.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "file_read".into(),
            reason: e.to_string(),
        })?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolResult::silent(content)),
            Err(e) => Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
        }
    }
}
