//! Gateway command handler (webhook server + agent loop).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, warn};

use maru::bus::{MessageBus, ResponseCorrelator};
use maru::channels::{Channel, WebhookChannel};
use maru::config::Config;
use maru::providers::resolve_provider;

use super::common::create_agent;

/// Start the gateway: webhook channel, outbound dispatch, and agent loop.
pub(crate) async fn cmd_gateway() -> Result<()> {
    println!("Starting Maru Gateway...");

    let config = Config::get();

    if resolve_provider(&config).is_none() {
        error!("No AI provider configured. Set MARU_PROVIDERS_OPENAI_API_KEY");
        error!("or add your API key to {:?}", Config::path());
        std::process::exit(1);
    }

    let bus = Arc::new(MessageBus::new());
    let agent = create_agent(config.clone(), Arc::clone(&bus)).await?;

    // Webhook is the only transport; without it the gateway has no ingress.
    if !config.channels.webhook.enabled {
        anyhow::bail!(
            "Webhook channel is disabled. Enable channels.webhook in {:?}",
            Config::path()
        );
    }

    let correlator = Arc::new(ResponseCorrelator::new());
    let mut webhook = WebhookChannel::from_config(
        &config.channels.webhook,
        Arc::clone(&bus),
        correlator,
    );
    webhook
        .start()
        .await
        .with_context(|| "Failed to start webhook channel")?;
    let webhook = Arc::new(webhook);

    // Outbound dispatch: route bus replies and typing signals to channels.
    let dispatch_bus = Arc::clone(&bus);
    let dispatch_webhook = Arc::clone(&webhook);
    let dispatch_handle = tokio::spawn(async move {
        while let Some(msg) = dispatch_bus.consume_outbound().await {
            match msg.channel.as_str() {
                "webhook" => {
                    if let Err(e) = dispatch_webhook.send(&msg).await {
                        warn!("Webhook delivery failed for chat {}: {}", msg.chat_id, e);
                    }
                }
                other => {
                    debug!("No channel registered for outbound message on '{}'", other);
                }
            }
        }
    });

    let agent_runner = Arc::clone(&agent);
    let agent_handle = tokio::spawn(async move {
        if let Err(e) = agent_runner.start().await {
            error!("Agent loop error: {}", e);
        }
    });

    println!();
    println!("Gateway is running. Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "Failed to listen for Ctrl+C")?;

    println!();
    println!("Shutting down...");

    agent.stop();
    webhook.shutdown();
    dispatch_handle.abort();

    let _ = tokio::time::timeout(Duration::from_secs(5), agent_handle).await;

    println!("Gateway stopped.");
    Ok(())
}
