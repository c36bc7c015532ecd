//! End-to-end tests for Maru
//!
//! These tests exercise the webhook transport, message bus, agent loop, and
//! capability registry wired together the way the gateway runs them, with
//! scripted providers standing in for the model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use maru::agent::AgentLoop;
use maru::bus::{MessageBus, ResponseCorrelator};
use maru::channels::{BaseChannelConfig, Channel, WebhookChannel, WebhookChannelConfig};
use maru::config::Config;
use maru::providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition};
use maru::session::{Message, SessionManager};
use maru::tools::{CreateToolTool, ToolRegistry};

/// Replays a scripted sequence of responses.
struct ScriptedProvider {
    responses: std::sync::Mutex<std::collections::VecDeque<LLMResponse>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> maru::Result<LLMResponse> {
        let mut responses = self.responses.lock().unwrap();
        Ok(responses
            .pop_front()
            .unwrap_or_else(|| LLMResponse::text("done")))
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Wires up bus, correlator, webhook channel, agent loop, and outbound
/// dispatch the way `maru gateway` does, against a scripted provider.
async fn start_stack(
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    config: Config,
) -> (std::net::SocketAddr, Arc<AgentLoop>, Arc<WebhookChannel>) {
    let bus = Arc::new(MessageBus::new());
    let correlator = Arc::new(ResponseCorrelator::new());

    let agent = Arc::new(AgentLoop::new(
        config,
        SessionManager::new_memory(),
        Arc::clone(&bus),
        tools,
    ));
    agent.set_provider(provider).await;

    let mut webhook = WebhookChannel::new(
        WebhookChannelConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            path: "/webhook".to_string(),
            secret: None,
        },
        BaseChannelConfig::new("webhook"),
        Arc::clone(&bus),
        correlator,
    );
    webhook.start().await.unwrap();
    let addr = webhook.local_addr().unwrap();
    let webhook = Arc::new(webhook);

    let dispatch_bus = Arc::clone(&bus);
    let dispatch_webhook = Arc::clone(&webhook);
    tokio::spawn(async move {
        while let Some(msg) = dispatch_bus.consume_outbound().await {
            if msg.channel == "webhook" {
                let _ = dispatch_webhook.send(&msg).await;
            }
        }
    });

    let runner = Arc::clone(&agent);
    tokio::spawn(async move {
        let _ = runner.start().await;
    });

    (addr, agent, webhook)
}

async fn post_webhook(addr: std::net::SocketAddr, body: &str) -> String {
    let request = format!(
        "POST /webhook HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_webhook_round_trip_through_agent() {
    let provider = Arc::new(ScriptedProvider::new(vec![LLMResponse::text("Hi")]));
    let (addr, agent, webhook) = start_stack(
        provider,
        Arc::new(ToolRegistry::new()),
        Config::default(),
    )
    .await;

    let response =
        post_webhook(addr, r#"{"sender":"alice","content":"Hello","chat_id":"hook-1"}"#).await;

    assert!(response.starts_with("HTTP/1.1 200 OK"), "got: {}", response);
    assert!(response.contains(r#""response":"Hi""#), "got: {}", response);

    // The session keyed by sender holds the completed exchange.
    let history = agent
        .session_manager()
        .history("webhook:alice")
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "Hello");
    assert_eq!(history[1].content, "Hi");

    agent.stop();
    webhook.shutdown();
}

#[tokio::test]
async fn test_tool_created_mid_turn_is_dispatchable_next_iteration() {
    let dir = tempdir().unwrap();

    let tools = Arc::new(ToolRegistry::new());
    tools
        .register(Arc::new(CreateToolTool::new(
            Arc::clone(&tools),
            dir.path().to_path_buf(),
        )))
        .await;

    // Iteration 1: model creates get_distance. Iteration 2: model calls it.
    // Iteration 3: model answers with the measured value.
    let create_args = serde_json::json!({
        "name": "get_distance",
        "description": "Read the ultrasonic range sensor",
        "parameters": {"type": "object", "properties": {}, "required": []},
        "script": "echo 12.3",
        "interpreter": "sh",
    })
    .to_string();

    let provider = Arc::new(ScriptedProvider::new(vec![
        LLMResponse::with_tools(
            "",
            vec![LLMToolCall {
                id: "call_1".to_string(),
                name: "create_tool".to_string(),
                arguments: create_args,
            }],
        ),
        LLMResponse::with_tools(
            "",
            vec![LLMToolCall {
                id: "call_2".to_string(),
                name: "get_distance".to_string(),
                arguments: "{}".to_string(),
            }],
        ),
        LLMResponse::text("It is 12.3 cm away."),
    ]));

    let mut config = Config::default();
    // Scripts run with the workspace as cwd; point it somewhere that exists.
    config.agents.defaults.workspace = dir.path().to_string_lossy().into_owned();

    let agent = AgentLoop::new(
        config,
        SessionManager::new_memory(),
        Arc::new(MessageBus::new()),
        Arc::clone(&tools),
    );
    agent.set_provider(provider).await;

    let answer = agent
        .process_direct("How far is the obstacle?", "cli:test")
        .await
        .unwrap();

    assert_eq!(answer, "It is 12.3 cm away.");
    assert!(tools.has("get_distance").await);

    // The descriptor and script were persisted for the next process start.
    assert!(dir.path().join("get_distance.json").exists());
    assert!(dir.path().join("get_distance.sh").exists());
}

#[tokio::test]
async fn test_persisted_tools_reload_into_fresh_registry() {
    let dir = tempdir().unwrap();

    let tools = Arc::new(ToolRegistry::new());
    let create = CreateToolTool::new(Arc::clone(&tools), dir.path().to_path_buf());
    tools.register(Arc::new(create)).await;

    let args = serde_json::json!({
        "name": "hello",
        "description": "Say hello",
        "script": "echo hello",
        "interpreter": "sh",
    });
    tools
        .execute("create_tool", args)
        .await
        .unwrap();

    // Simulate a process restart with an empty registry.
    let fresh = ToolRegistry::new();
    let loaded = maru::tools::load_dynamic_tools(dir.path(), &fresh, Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(loaded, 1);
    assert!(fresh.has("hello").await);
}

#[tokio::test]
async fn test_webhook_caller_times_out_when_agent_never_replies() {
    // No agent loop consuming the bus, so no reply ever arrives; use the
    // correlator directly with a short timeout rather than waiting 60s.
    let correlator = ResponseCorrelator::new();
    let result = correlator
        .await_response("hook-slow", Duration::from_millis(50))
        .await;

    assert!(matches!(
        result,
        Err(maru::MaruError::CorrelationTimeout(_))
    ));
    assert!(!correlator.has_pending("hook-slow"));
}
