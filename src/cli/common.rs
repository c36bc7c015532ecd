//! Shared CLI helpers used across multiple command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use maru::agent::{AgentLoop, ContextBuilder};
use maru::bus::MessageBus;
use maru::config::Config;
use maru::providers::resolve_provider;
use maru::session::SessionManager;
use maru::tools::{load_dynamic_tools, CreateToolTool, EchoTool, ToolRegistry};

/// Create and configure an agent with all tools registered.
///
/// Builds the session store, populates the capability registry (built-in
/// tools, the tool-creation capability, and any dynamic tools persisted from
/// earlier runs), and attaches the configured model provider.
pub(crate) async fn create_agent(config: Config, bus: Arc<MessageBus>) -> Result<Arc<AgentLoop>> {
    let session_manager = SessionManager::new().with_context(|| "Failed to open session store")?;

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(EchoTool)).await;

    let tools_dir = config.dynamic_tools_path();
    let script_timeout = Duration::from_secs(config.tools.script_timeout_secs);
    tools
        .register(Arc::new(
            CreateToolTool::new(Arc::clone(&tools), tools_dir.clone())
                .with_script_timeout(script_timeout),
        ))
        .await;

    match load_dynamic_tools(&tools_dir, &tools, script_timeout).await {
        Ok(0) => {}
        Ok(n) => info!("Loaded {} dynamic tool(s) from {}", n, tools_dir.display()),
        Err(e) => warn!("Failed to load dynamic tools: {}", e),
    }

    let context_builder = match config.agents.defaults.system_prompt.as_deref() {
        Some(prompt) if !prompt.is_empty() => ContextBuilder::new().with_system_prompt(prompt),
        _ => ContextBuilder::new(),
    };
    let agent =
        AgentLoop::with_context_builder(config.clone(), session_manager, bus, tools, context_builder);

    if let Some(provider) = resolve_provider(&config) {
        agent.set_provider(provider).await;
    }

    Ok(Arc::new(agent))
}
