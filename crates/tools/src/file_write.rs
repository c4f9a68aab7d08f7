//! File write tool — write or create files within the workspace.

use async_trait::async_trait;
use concierge_core::error::ToolError;
use concierge_core::tool::{Tool, ToolResult};
use crate::scope::WorkspaceScope;

pub struct FileWriteTool {
    scope: WorkspaceScope,
}

impl FileWriteTool {
    pub fn new(scope: WorkspaceScope) -> Self {
        Self { scope }
    }
}

impl Default for FileWriteTool {
    fn default() -> Self {
        Self::new(WorkspaceScope::unrestricted())
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved = self.scope.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "file_write".into(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = resolved.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failure(format!("Failed to create directory: {e}")));
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => Ok(ToolResult::silent(format!(
                "Wrote {} bytes to {path}",
                content.len()
            ))),
            Err(e) => Ok(ToolResult::failure(format!("Failed to write file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(WorkspaceScope::new(dir.path().to_path_buf(), true));
        let result = tool
            .execute(serde_json::json!({
                "path": "nested/dir/file.txt",
                "content": "nested content"
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("14 bytes"));
        let content = std::fs::read_to_string(dir.path().join("nested/dir/file.txt")).unwrap();
        assert_eq!(content, "nested content");
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let tool = FileWriteTool::default();
        let result = tool.execute(serde_json::json!({ "path": "x.txt" })).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(WorkspaceScope::new(dir.path().to_path_buf(), true));
        let result = tool
            .execute(serde_json::json!({
                "path": "../../../etc/crontab",
                "content": "malicious"
            }))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
