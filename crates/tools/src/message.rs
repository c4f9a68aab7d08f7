//! Message tool — lets a working role talk to the user mid-task.
//!
//! The result is flagged user-facing, so the execution loop publishes it to
//! the channel right away in addition to feeding it back to the model.

use async_trait::async_trait;
use concierge_core::error::ToolError;
use concierge_core::tool::{Tool, ToolResult};

pub struct MessageTool;

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a short progress update or question to the user while you keep working."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Text to show the user"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let content = arguments["content"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        Ok(ToolResult::user_facing(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn result_is_user_facing() {
        let result = MessageTool
            .execute(serde_json::json!({"content": " halfway there "}))
            .await
            .unwrap();
        assert!(result.user_facing);
        assert_eq!(result.output, "halfway there");
    }

    #[tokio::test]
    async fn blank_content_rejected() {
        let result = MessageTool.execute(serde_json::json!({"content": "  "})).await;
        assert!(result.is_err());
    }
}
