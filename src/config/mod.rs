//! Configuration loading and management.
//!
//! Configuration lives at `~/.maru/config.json` and is overridable
//! through `MARU_*` environment variables. A missing file yields the
//! defaults, so the assistant runs with zero setup.

mod types;

pub use types::{
    AgentConfig, AgentDefaults, ChannelsConfig, Config, ProviderConfig, ProvidersConfig,
    ToolsConfig, WebhookConfig,
};

use crate::error::{MaruError, Result};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::RwLock;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

impl Config {
    /// Returns the configuration directory (`~/.maru`)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".maru")
    }

    /// Returns the configuration file path (`~/.maru/config.json`)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path, falling back to defaults
    /// if the file does not exist. Environment overrides are applied last.
    pub fn load() -> Result<Config> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &PathBuf) -> Result<Config> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| MaruError::Config(format!("Invalid config file: {}", e)))?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `MARU_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MARU_AGENTS_DEFAULTS_WORKSPACE") {
            self.agents.defaults.workspace = v;
        }
        if let Ok(v) = std::env::var("MARU_AGENTS_DEFAULTS_MODEL") {
            self.agents.defaults.model = v;
        }
        if let Ok(v) = std::env::var("MARU_AGENTS_DEFAULTS_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.agents.defaults.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("MARU_AGENTS_DEFAULTS_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.agents.defaults.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("MARU_AGENTS_DEFAULTS_MAX_TOOL_ITERATIONS") {
            if let Ok(n) = v.parse() {
                self.agents.defaults.max_tool_iterations = n;
            }
        }

        if let Ok(v) = std::env::var("MARU_PROVIDERS_OPENAI_API_KEY") {
            self.providers.openai.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("MARU_PROVIDERS_OPENAI_API_BASE") {
            self.providers.openai.api_base = Some(v);
        }

        if let Ok(v) = std::env::var("MARU_CHANNELS_WEBHOOK_ENABLED") {
            self.channels.webhook.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("MARU_CHANNELS_WEBHOOK_HOST") {
            self.channels.webhook.host = v;
        }
        if let Ok(v) = std::env::var("MARU_CHANNELS_WEBHOOK_PORT") {
            if let Ok(n) = v.parse() {
                self.channels.webhook.port = n;
            }
        }
        if let Ok(v) = std::env::var("MARU_CHANNELS_WEBHOOK_PATH") {
            self.channels.webhook.path = v;
        }
        if let Ok(v) = std::env::var("MARU_CHANNELS_WEBHOOK_SECRET") {
            self.channels.webhook.secret = Some(v);
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the global configuration.
    ///
    /// This should be called once at startup. Subsequent calls will return
    /// an error if the config is already initialized.
    pub fn init() -> Result<()> {
        let config = Self::load()?;
        CONFIG
            .set(RwLock::new(config))
            .map_err(|_| MaruError::Config("Configuration already initialized".to_string()))
    }

    /// Initialize the global configuration with a specific config.
    ///
    /// Useful for testing or custom initialization.
    pub fn init_with(config: Config) -> Result<()> {
        CONFIG
            .set(RwLock::new(config))
            .map_err(|_| MaruError::Config("Configuration already initialized".to_string()))
    }

    /// Get a clone of the current global configuration.
    ///
    /// Returns default configuration if not yet initialized.
    pub fn get() -> Config {
        CONFIG
            .get()
            .and_then(|lock| lock.read().ok())
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Returns the expanded workspace path (resolves ~ to home directory)
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agents.defaults.workspace)
    }

    /// Returns the expanded dynamic tools directory
    pub fn dynamic_tools_path(&self) -> PathBuf {
        expand_home(&self.tools.dynamic_dir)
    }
}

/// Expand ~ to home directory in a path string
pub fn expand_home(path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::from(path);
    }

    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            if path.len() > 1 && path.chars().nth(1) == Some('/') {
                return home.join(&path[2..]);
            }
            return home;
        }
    }

    PathBuf::from(path)
}
