//! Tools module - capability definitions and execution for LLM function calling
//!
//! This module provides the infrastructure for defining and executing tools
//! that the model can call during a turn, plus the runtime extension path
//! that lets the agent create new tools for itself.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Execution context (channel, chat_id, workspace)
//! - `ToolRegistry`: Central registry for managing and executing tools
//! - `CreateToolTool` / `ScriptTool`: runtime-created script tools
//!
//! # Example
//!
//! ```rust
//! use maru::tools::{Tool, ToolContext, ToolRegistry, EchoTool};
//! use std::sync::Arc;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let registry = ToolRegistry::new();
//! registry.register(Arc::new(EchoTool)).await;
//!
//! let result = registry.execute("echo", json!({"message": "Hello!"})).await;
//! assert_eq!(result.unwrap(), "Hello!");
//!
//! let definitions = registry.definitions().await;
//! assert_eq!(definitions.len(), 1);
//! # });
//! ```

mod dynamic;
mod registry;
mod types;

pub use dynamic::{load_dynamic_tools, CreateToolTool, DynamicToolDef, ScriptTool};
pub use registry::ToolRegistry;
pub use types::{Tool, ToolContext};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A simple echo tool for testing purposes.
///
/// # Example
///
/// ```rust
/// use maru::tools::{Tool, ToolContext, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let tool = EchoTool;
/// let ctx = ToolContext::new();
/// let result = tool.execute(json!({"message": "Hello"}), &ctx).await;
/// assert_eq!(result.unwrap(), "Hello");
/// # });
/// ```
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_echo_tool_metadata() {
        let tool = EchoTool;
        assert_eq!(tool.name(), "echo");
        assert_eq!(tool.description(), "Echoes back the provided message");
        let params = tool.parameters();
        assert_eq!(params["type"], "object");
        assert_eq!(params["required"][0], "message");
    }

    #[tokio::test]
    async fn test_echo_tool_execute() {
        let tool = EchoTool;
        let result = tool
            .execute(json!({"message": "ping"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(result, "ping");
    }

    #[tokio::test]
    async fn test_echo_tool_missing_message() {
        let tool = EchoTool;
        let result = tool.execute(json!({}), &ToolContext::new()).await.unwrap();
        assert_eq!(result, "(no message)");
    }
}
