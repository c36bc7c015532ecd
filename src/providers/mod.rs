//! Providers module - LLM provider clients
//!
//! This module defines the `LLMProvider` trait and common types for talking
//! to model providers. Each concrete client implements `LLMProvider` so the
//! agent loop sees one consistent chat interface.
//!
//! # Example
//!
//! ```rust,ignore
//! use maru::providers::{ChatOptions, LLMProvider};
//! use maru::providers::openai::OpenAIProvider;
//! use maru::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(1000);
//!
//!     let response = provider.chat(messages, vec![], None, options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
mod types;

pub use openai::OpenAIProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};

use std::sync::Arc;

use crate::config::Config;

/// Build the provider configured for this runtime, if any.
///
/// Returns `None` when no API key is configured; callers decide whether that
/// is a warning (CLI) or fatal (gateway).
pub fn resolve_provider(config: &Config) -> Option<Arc<dyn LLMProvider>> {
    let openai = &config.providers.openai;
    let api_key = openai.api_key.as_deref()?;
    if api_key.is_empty() {
        return None;
    }

    let provider = match openai.api_base.as_deref() {
        Some(base) if !base.is_empty() => OpenAIProvider::with_base_url(api_key, base),
        _ => OpenAIProvider::new(api_key),
    };
    Some(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_provider_without_key() {
        let config = Config::default();
        assert!(resolve_provider(&config).is_none());
    }

    #[test]
    fn test_resolve_provider_with_key() {
        let mut config = Config::default();
        config.providers.openai.api_key = Some("sk-test".to_string());

        let provider = resolve_provider(&config).expect("provider should resolve");
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_resolve_provider_empty_key() {
        let mut config = Config::default();
        config.providers.openai.api_key = Some(String::new());
        assert!(resolve_provider(&config).is_none());
    }
}
