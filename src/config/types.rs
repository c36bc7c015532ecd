//! Configuration type definitions.
//!
//! All types implement serde traits for JSON serialization and have
//! sensible defaults, so a partial config file (or none at all) works.

use serde::{Deserialize, Serialize};

/// Main configuration struct for Maru
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (model, tokens, iterations)
    pub agents: AgentConfig,
    /// Channel configurations
    pub channels: ChannelsConfig,
    /// LLM provider configurations
    pub providers: ProvidersConfig,
    /// Tools configuration
    pub tools: ToolsConfig,
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Default agent settings
    pub defaults: AgentDefaults,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory path
    pub workspace: String,
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tool iterations per turn
    pub max_tool_iterations: u32,
    /// System prompt prepended to every conversation
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.maru/workspace".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            system_prompt: None,
        }
    }
}

// ============================================================================
// Channel Configurations
// ============================================================================

/// All channel configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Webhook inbound channel configuration
    pub webhook: WebhookConfig,
}

/// Webhook inbound channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Whether the channel is enabled
    pub enabled: bool,
    /// Address to bind the HTTP server to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// URL path to accept webhook requests on
    pub path: String,
    /// Optional Bearer token for request authentication
    #[serde(default)]
    pub secret: Option<String>,
    /// Allowlist of sender IDs (empty = allow all)
    #[serde(default)]
    pub allow_from: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 18791,
            path: "/webhook".to_string(),
            secret: None,
            allow_from: Vec::new(),
        }
    }
}

// ============================================================================
// Provider Configurations
// ============================================================================

/// All LLM provider configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI-compatible provider configuration
    pub openai: ProviderConfig,
}

/// Generic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key for authentication
    pub api_key: Option<String>,
    /// Custom API base URL
    pub api_base: Option<String>,
}

// ============================================================================
// Tools Configuration
// ============================================================================

/// Tools configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory holding dynamic tool descriptors and scripts.
    /// Relative paths and `~` are resolved against the home directory.
    pub dynamic_dir: String,
    /// Timeout in seconds for a single script tool execution
    pub script_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dynamic_dir: "~/.maru/tools".to_string(),
            script_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_defaults() {
        let defaults = AgentDefaults::default();
        assert_eq!(defaults.max_tokens, 8192);
        assert_eq!(defaults.temperature, 0.7);
        assert_eq!(defaults.max_tool_iterations, 20);
        assert_eq!(defaults.workspace, "~/.maru/workspace");
        assert!(defaults.system_prompt.is_none());
    }

    #[test]
    fn test_webhook_defaults() {
        let webhook = WebhookConfig::default();
        assert!(!webhook.enabled);
        assert_eq!(webhook.host, "127.0.0.1");
        assert_eq!(webhook.port, 18791);
        assert_eq!(webhook.path, "/webhook");
        assert!(webhook.secret.is_none());
        assert!(webhook.allow_from.is_empty());
    }

    #[test]
    fn test_webhook_partial_deserialize() {
        let json = r#"{"enabled": true, "port": 9999}"#;
        let webhook: WebhookConfig = serde_json::from_str(json).unwrap();
        assert!(webhook.enabled);
        assert_eq!(webhook.port, 9999);
        assert_eq!(webhook.path, "/webhook");
    }

    #[test]
    fn test_provider_config_deserialize() {
        let json = r#"{
            "openai": {
                "api_key": "sk-xxx",
                "api_base": "https://api.openai.com/v1"
            }
        }"#;
        let providers: ProvidersConfig = serde_json::from_str(json).unwrap();
        assert_eq!(providers.openai.api_key, Some("sk-xxx".to_string()));
        assert_eq!(
            providers.openai.api_base,
            Some("https://api.openai.com/v1".to_string())
        );
    }

    #[test]
    fn test_tools_defaults() {
        let tools = ToolsConfig::default();
        assert_eq!(tools.dynamic_dir, "~/.maru/tools");
        assert_eq!(tools.script_timeout_secs, 60);
    }
}
