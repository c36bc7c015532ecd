//! Turn engine
//!
//! This module drives a full turn: assemble context, call the model,
//! execute proposed tool calls, feed results back, and finalize with a
//! single assistant answer. It also runs the bus consume loop that
//! turns inbound messages into replies.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::Config;
use crate::error::{MaruError, Result};
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, SessionManager, ToolCall};
use crate::tools::{Tool, ToolContext, ToolRegistry};

use super::context::ContextBuilder;

/// Answer returned when the model finishes a turn with nothing to say.
pub const FALLBACK_ANSWER: &str = "I've completed processing but have no response to give.";

/// Interval between typing signals while a turn is in flight.
const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// Lifecycle state of the consume loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    /// Not consuming messages.
    Stopped = 0,
    /// Consuming messages.
    Running = 1,
    /// Stop requested, loop winding down.
    Draining = 2,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Lifecycle::Running,
            2 => Lifecycle::Draining,
            _ => Lifecycle::Stopped,
        }
    }
}

/// Aborts the typing ticker when the turn ends, however it ends.
struct TypingGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The turn engine: processes messages, calls the provider, and runs tools.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use maru::agent::AgentLoop;
/// use maru::bus::MessageBus;
/// use maru::config::Config;
/// use maru::session::SessionManager;
/// use maru::tools::ToolRegistry;
///
/// let config = Config::default();
/// let sessions = SessionManager::new_memory();
/// let bus = Arc::new(MessageBus::new());
/// let tools = Arc::new(ToolRegistry::new());
/// let agent = AgentLoop::new(config, sessions, bus, tools);
/// assert!(!agent.is_running());
/// ```
pub struct AgentLoop {
    /// Agent configuration
    config: Config,
    /// Session manager for conversation state
    session_manager: Arc<SessionManager>,
    /// Message bus for input/output
    bus: Arc<MessageBus>,
    /// The LLM provider (Arc<dyn ..> allows cheap cloning without holding the lock)
    provider: Arc<RwLock<Option<Arc<dyn LLMProvider>>>>,
    /// Shared tool registry; runtime-created tools land here mid-turn
    tools: Arc<ToolRegistry>,
    /// Consume loop lifecycle state
    state: AtomicU8,
    /// Context builder for constructing model messages
    context_builder: ContextBuilder,
    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        config: Config,
        session_manager: SessionManager,
        bus: Arc<MessageBus>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            session_manager: Arc::new(session_manager),
            bus,
            provider: Arc::new(RwLock::new(None)),
            tools,
            state: AtomicU8::new(Lifecycle::Stopped as u8),
            context_builder: ContextBuilder::new(),
            shutdown_tx,
        }
    }

    /// Create a new agent loop with a custom context builder.
    pub fn with_context_builder(
        config: Config,
        session_manager: SessionManager,
        bus: Arc<MessageBus>,
        tools: Arc<ToolRegistry>,
        context_builder: ContextBuilder,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            session_manager: Arc::new(session_manager),
            bus,
            provider: Arc::new(RwLock::new(None)),
            tools,
            state: AtomicU8::new(Lifecycle::Stopped as u8),
            context_builder,
            shutdown_tx,
        }
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Check if the consume loop is currently running.
    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    /// Set the LLM provider to use.
    pub async fn set_provider(&self, provider: Arc<dyn LLMProvider>) {
        let mut p = self.provider.write().await;
        *p = Some(provider);
    }

    /// Register a tool with the shared registry.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.register(tool).await;
    }

    /// Get the number of registered tools.
    pub async fn tool_count(&self) -> usize {
        self.tools.len().await
    }

    /// Check if a tool is registered.
    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.has(name).await
    }

    /// Spawn the typing ticker for a turn.
    ///
    /// Publishes a typing signal immediately and then every 4 seconds
    /// until the returned guard is dropped. The CLI renders nothing for
    /// typing, so direct turns skip the ticker entirely.
    fn spawn_typing(&self, msg: &InboundMessage) -> Option<TypingGuard> {
        if msg.channel == "cli" {
            return None;
        }
        let bus = Arc::clone(&self.bus);
        let channel = msg.channel.clone();
        let chat_id = msg.chat_id.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TYPING_INTERVAL);
            loop {
                ticker.tick().await;
                if bus
                    .publish_outbound(OutboundMessage::typing(&channel, &chat_id))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        Some(TypingGuard { handle })
    }

    /// Process a single inbound message through a full turn.
    ///
    /// The working message list built here is ephemeral; only the pair
    /// (user input, final answer) is appended to the session once the
    /// turn finalizes. A turn that errors mid-flight leaves the session
    /// untouched.
    ///
    /// # Returns
    /// The assistant's final answer. Never empty: an empty model answer
    /// or an exhausted tool budget yields the fixed fallback answer.
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<String> {
        // Clone the provider Arc early and release the lock immediately,
        // so multi-second model calls never block set_provider().
        let provider = {
            let guard = self.provider.read().await;
            Arc::clone(
                guard
                    .as_ref()
                    .ok_or_else(|| MaruError::Provider("No provider configured".into()))?,
            )
        };

        let _typing = self.spawn_typing(msg);

        let history = self.session_manager.history(&msg.session_key).await?;
        let definitions = self.tools.definitions().await;
        let mut working = self
            .context_builder
            .build_messages(history, &msg.content, &definitions);

        let options = ChatOptions::new()
            .with_max_tokens(self.config.agents.defaults.max_tokens)
            .with_temperature(self.config.agents.defaults.temperature);
        let model = Some(self.config.agents.defaults.model.as_str());

        let workspace = self.config.workspace_path();
        let workspace_str = workspace.to_string_lossy();
        let tool_ctx = ToolContext::new()
            .with_channel(&msg.channel, &msg.chat_id)
            .with_sender(&msg.sender_id)
            .with_workspace(&workspace_str);

        let max_iterations = self.config.agents.defaults.max_tool_iterations;
        let mut iterations = 0;
        let mut final_answer: Option<String> = None;

        while iterations < max_iterations {
            iterations += 1;

            // Fresh snapshot each pass: tools created mid-turn become
            // visible on the very next model call.
            let definitions = self.tools.definitions().await;

            let response = provider
                .chat(working.clone(), definitions, model, options.clone())
                .await?;

            if !response.has_tool_calls() {
                final_answer = Some(response.content);
                break;
            }

            debug!(
                iteration = iterations,
                calls = response.tool_calls.len(),
                "Executing tool calls"
            );

            let tool_calls: Vec<ToolCall> = response
                .tool_calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .collect();
            working.push(Message::assistant_with_tools(
                &response.content,
                tool_calls.clone(),
            ));

            for tool_call in &tool_calls {
                info!(tool = %tool_call.name, id = %tool_call.id, "Executing tool");

                let args: serde_json::Value = match serde_json::from_str(&tool_call.arguments) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(tool = %tool_call.name, error = %e, "Invalid JSON in tool arguments");
                        serde_json::json!({"_parse_error": format!("Invalid arguments JSON: {}", e)})
                    }
                };

                let result = match self
                    .tools
                    .execute_with_context(&tool_call.name, args, &tool_ctx)
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        error!(tool = %tool_call.name, error = %e, "Tool execution failed");
                        format!("Error: {}", e)
                    }
                };

                working.push(Message::tool_result(&tool_call.id, &result));
            }
        }

        let answer = match final_answer {
            Some(content) if !content.trim().is_empty() => content,
            _ => {
                info!(
                    iterations = iterations,
                    "Turn ended without content, using fallback answer"
                );
                FALLBACK_ANSWER.to_string()
            }
        };

        self.session_manager
            .append(&msg.session_key, Message::user(&msg.content))
            .await?;
        self.session_manager
            .append(&msg.session_key, Message::assistant(&answer))
            .await?;
        self.session_manager.persist(&msg.session_key).await?;

        Ok(answer)
    }

    /// Process raw text as a direct turn, bypassing the bus.
    ///
    /// Used by the CLI: the synthetic message runs on the `cli` channel
    /// with sender `user` and chat `direct`, so no typing signals are
    /// produced.
    pub async fn process_direct(&self, text: &str, session_key: &str) -> Result<String> {
        let msg = InboundMessage::new("cli", "user", "direct", text).with_session_key(session_key);
        self.process_message(&msg).await
    }

    /// Start the consume loop.
    ///
    /// Consumes inbound messages and spawns one task per message, so
    /// turns for different chats proceed concurrently. Returns when
    /// `stop()` is signalled or the inbound channel closes.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self
            .state
            .compare_exchange(
                Lifecycle::Stopped as u8,
                Lifecycle::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(MaruError::Config("Agent loop already running".into()));
        }
        info!("Starting agent loop");

        // Subscribe fresh and consume any stale stop signal from a previous run.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }
                msg = self.bus.consume_inbound() => {
                    match msg {
                        Some(msg) => {
                            let this = Arc::clone(&self);
                            let request_id = uuid::Uuid::new_v4();
                            let request_span = info_span!(
                                "request",
                                request_id = %request_id,
                                chat_id = %msg.chat_id,
                                session_key = %msg.session_key,
                                channel = %msg.channel,
                                sender = %msg.sender_id,
                            );
                            tokio::spawn(async move {
                                info!("Processing message");
                                let start = std::time::Instant::now();
                                match this.process_message(&msg).await {
                                    Ok(response) => {
                                        info!(
                                            latency_ms = start.elapsed().as_millis() as u64,
                                            response_len = response.len(),
                                            "Request completed"
                                        );
                                        let outbound = OutboundMessage::reply_to(&msg, &response);
                                        if let Err(e) = this.bus.publish_outbound(outbound).await {
                                            error!("Failed to publish outbound message: {}", e);
                                        }
                                    }
                                    Err(e) => {
                                        error!(
                                            latency_ms = start.elapsed().as_millis() as u64,
                                            error = %e,
                                            "Request failed"
                                        );
                                        let error_msg = OutboundMessage::reply_to(
                                            &msg,
                                            &format!("Error: {}", e),
                                        );
                                        this.bus.publish_outbound(error_msg).await.ok();
                                    }
                                }
                            }.instrument(request_span));
                        }
                        None => {
                            info!("Inbound channel closed");
                            break;
                        }
                    }
                }
            }

            if self.lifecycle() != Lifecycle::Running {
                break;
            }
        }

        self.state.store(Lifecycle::Stopped as u8, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    /// Request the consume loop to stop.
    ///
    /// Moves Running to Draining and wakes the loop; in-flight turns
    /// complete on their own tasks. No-op when not running.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                Lifecycle::Running as u8,
                Lifecycle::Draining as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            info!("Stopping agent loop");
            let _ = self.shutdown_tx.send(true);
        }
    }

    /// Get a reference to the session manager.
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    /// Get a reference to the message bus.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Get a reference to the shared tool registry.
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
