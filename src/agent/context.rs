//! Context assembly for model calls
//!
//! The `ContextBuilder` turns session history plus the new user input
//! into the ordered message list sent to the provider. The system block
//! carries the base instructions, optional workspace instruction
//! documents, a capability summary, and the current time.

use chrono::Utc;

use crate::providers::ToolDefinition;
use crate::session::Message;

/// Default system prompt for the Maru agent
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Maru, a lightweight personal AI assistant.

You have access to tools to help accomplish tasks. Use them when needed.
You can also create new tools for yourself with create_tool when an existing
capability does not cover a request.

Be concise but helpful. Focus on completing the user's request efficiently."#;

/// Builder for constructing conversation context for LLM calls.
///
/// # Example
///
/// ```rust
/// use maru::agent::ContextBuilder;
///
/// let builder = ContextBuilder::new();
/// let messages = builder.build_messages(vec![], "Hello!", &[]);
/// assert_eq!(messages.len(), 2); // system + user message
/// ```
pub struct ContextBuilder {
    /// The base instructions
    system_prompt: String,
    /// Optional workspace instruction documents appended to the system block
    workspace_docs: Option<String>,
}

impl ContextBuilder {
    /// Create a new context builder with the default system prompt.
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            workspace_docs: None,
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Add workspace instruction documents to the system block.
    pub fn with_workspace_docs(mut self, docs: &str) -> Self {
        self.workspace_docs = Some(docs.to_string());
        self
    }

    /// Build the system message.
    ///
    /// The capability summary lists each tool by name with its
    /// description so the model knows what it can reach for.
    pub fn build_system_message(&self, capabilities: &[ToolDefinition]) -> Message {
        let mut content = String::new();
        content.push_str(&self.system_prompt);

        if let Some(ref docs) = self.workspace_docs {
            content.push_str("\n\n## Workspace Notes\n\n");
            content.push_str(docs);
        }

        if !capabilities.is_empty() {
            content.push_str("\n\n## Capabilities\n\n");
            for def in capabilities {
                content.push_str(&format!("- {}: {}\n", def.name, def.description));
            }
        }

        content.push_str(&format!(
            "\n\nCurrent time: {}",
            Utc::now().format("%A, %B %-d, %Y at %H:%M UTC")
        ));

        Message::system(&content)
    }

    /// Build the full message list for an LLM call.
    ///
    /// Order: system block, conversation history, then the new user
    /// input (omitted when empty). History is never mutated.
    pub fn build_messages(
        &self,
        history: Vec<Message>,
        user_input: &str,
        capabilities: &[ToolDefinition],
    ) -> Vec<Message> {
        let mut messages = vec![self.build_system_message(capabilities)];
        messages.extend(history);
        if !user_input.is_empty() {
            messages.push(Message::user(user_input));
        }
        messages
    }

    /// Get the current base instructions.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
