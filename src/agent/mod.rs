//! Agent module - turn engine and conversation handling
//!
//! This module drives the conversation: it processes inbound messages,
//! builds model context from system prompt and session history, calls
//! the LLM provider, executes tool calls, and finalizes each turn with
//! exactly one assistant answer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │  (OpenAI)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Session   │     │    Tools    │
//!                     │   Manager   │     │  Registry   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use maru::agent::AgentLoop;
//! use maru::bus::MessageBus;
//! use maru::config::Config;
//! use maru::providers::OpenAIProvider;
//! use maru::session::SessionManager;
//! use maru::tools::{EchoTool, ToolRegistry};
//!
//! async fn run_agent() {
//!     let config = Config::default();
//!     let sessions = SessionManager::new_memory();
//!     let bus = Arc::new(MessageBus::new());
//!     let tools = Arc::new(ToolRegistry::new());
//!     let agent = Arc::new(AgentLoop::new(config, sessions, bus, tools));
//!
//!     agent.set_provider(Arc::new(OpenAIProvider::new("your-api-key"))).await;
//!     agent.register_tool(Arc::new(EchoTool)).await;
//!
//!     agent.start().await.unwrap();
//! }
//! ```

mod context;
mod r#loop;

pub use context::ContextBuilder;
pub use r#loop::{AgentLoop, Lifecycle, FALLBACK_ANSWER};
