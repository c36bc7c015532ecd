//! Status command handler.

use anyhow::Result;

use maru::config::Config;
use maru::providers::resolve_provider;

/// Show system status.
pub(crate) async fn cmd_status() -> Result<()> {
    let config = Config::get();

    println!("Maru Status");
    println!("===========");
    println!();

    println!("Configuration");
    println!("-------------");
    println!("  Config file:   {:?}", Config::path());
    println!("  Config exists: {}", Config::path().exists());
    println!();

    println!("Workspace");
    println!("---------");
    let workspace_path = config.workspace_path();
    println!("  Path:   {:?}", workspace_path);
    println!("  Exists: {}", workspace_path.exists());
    println!();

    println!("Sessions");
    println!("--------");
    let sessions_path = Config::dir().join("sessions");
    println!("  Path:   {:?}", sessions_path);
    println!("  Exists: {}", sessions_path.exists());
    if sessions_path.exists() {
        let session_count = std::fs::read_dir(&sessions_path)
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0);
        println!("  Count:  {}", session_count);
    }
    println!();

    println!("Agent Defaults");
    println!("--------------");
    println!("  Model:               {}", config.agents.defaults.model);
    println!("  Max tokens:          {}", config.agents.defaults.max_tokens);
    println!("  Temperature:         {}", config.agents.defaults.temperature);
    println!(
        "  Max tool iterations: {}",
        config.agents.defaults.max_tool_iterations
    );
    println!();

    println!("Provider");
    println!("--------");
    let provider_status = if config
        .providers
        .openai
        .api_key
        .as_deref()
        .is_some_and(|k| !k.is_empty())
    {
        "configured"
    } else {
        "not set"
    };
    println!("  OpenAI: {}", provider_status);
    println!(
        "  Active: {}",
        resolve_provider(&config)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!();

    println!("Webhook Channel");
    println!("---------------");
    let webhook = &config.channels.webhook;
    println!("  Enabled: {}", webhook.enabled);
    println!("  Bind:    {}:{}{}", webhook.host, webhook.port, webhook.path);
    println!(
        "  Secret:  {}",
        if webhook.secret.as_deref().is_some_and(|s| !s.is_empty()) {
            "configured"
        } else {
            "not set"
        }
    );
    println!(
        "  Allowed senders: {}",
        if webhook.allow_from.is_empty() {
            "all".to_string()
        } else {
            webhook.allow_from.join(", ")
        }
    );
    println!();

    println!("Dynamic Tools");
    println!("-------------");
    let tools_dir = config.dynamic_tools_path();
    println!("  Path:   {:?}", tools_dir);
    println!("  Exists: {}", tools_dir.exists());
    if tools_dir.exists() {
        let descriptor_count = std::fs::read_dir(&tools_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0);
        println!("  Count:  {}", descriptor_count);
    }

    Ok(())
}
