//! Maru - Lightweight personal AI assistant framework

pub mod agent;
pub mod bus;
pub mod channels;
pub mod config;
pub mod error;
pub mod providers;
pub mod session;
pub mod tools;

pub use bus::{
    InboundMessage, MediaAttachment, MediaType, MessageAction, MessageBus, OutboundMessage,
    ResponseCorrelator,
};
pub use config::Config;
pub use error::{MaruError, Result};
pub use providers::{
    ChatOptions, LLMProvider, LLMResponse, LLMToolCall, OpenAIProvider, ToolDefinition, Usage,
};
pub use session::{Message, Role, Session, SessionManager, ToolCall};
