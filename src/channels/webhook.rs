//! Synchronous HTTP webhook channel.
//!
//! External services POST a JSON payload to a configurable endpoint. The
//! handler publishes the payload to the message bus as an inbound message,
//! then parks the HTTP request on a [`ResponseCorrelator`] slot until the
//! agent loop publishes the matching reply, and only then answers the caller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐         ┌──────────────────┐
//! │  External Service│ ──POST─>│  WebhookChannel  │──┐ InboundMessage
//! │  (any HTTP       │<──200───│  (TcpListener)   │  ▼
//! │   client)        │         └────────▲─────────┘ ┌────────────┐
//! └──────────────────┘                  │           │ MessageBus │
//!                              deliver  │           └─────┬──────┘
//!                              ┌────────┴──────────┐      │
//!                              │ResponseCorrelator │<─────┘ reply
//!                              └───────────────────┘   (AgentLoop)
//! ```
//!
//! # Request Format
//!
//! ```json
//! POST /webhook HTTP/1.1
//! Content-Type: application/json
//! Authorization: Bearer <optional-secret>
//!
//! {
//!     "sender": "external-service",
//!     "content": "Hello, Maru!",
//!     "chat_id": "hook-123"
//! }
//! ```
//!
//! `sender` defaults to `webhook-user`, `chat_id` to a fresh `hook-<uuid>`,
//! and the session key to `webhook:<sender>` so repeat callers share history.
//! The response is `200 {"response": ..., "chat_id": ...}` or `504` if the
//! agent does not answer within 60 seconds.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{InboundMessage, MessageBus, OutboundMessage, ResponseCorrelator};
use crate::config::WebhookConfig;
use crate::error::{MaruError, Result};

use super::types::{BaseChannelConfig, Channel};

/// Maximum allowed request body size (1 MiB)
const MAX_BODY_SIZE: usize = 1_048_576;

/// Maximum allowed header section size (8 KiB)
const MAX_HEADER_SIZE: usize = 8_192;

/// How long a caller waits for the agent's reply before getting a 504.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

const HTTP_400_BAD_REQUEST: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain\r\nContent-Length: 11\r\nConnection: close\r\n\r\nBad Request";
const HTTP_401_UNAUTHORIZED: &str = "HTTP/1.1 401 Unauthorized\r\nContent-Type: text/plain\r\nContent-Length: 12\r\nConnection: close\r\n\r\nUnauthorized";
const HTTP_404_NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot Found";
const HTTP_405_METHOD_NOT_ALLOWED: &str = "HTTP/1.1 405 Method Not Allowed\r\nContent-Type: text/plain\r\nContent-Length: 18\r\nConnection: close\r\n\r\nMethod Not Allowed";
const HTTP_413_PAYLOAD_TOO_LARGE: &str = "HTTP/1.1 413 Payload Too Large\r\nContent-Type: text/plain\r\nContent-Length: 17\r\nConnection: close\r\n\r\nPayload Too Large";
const HTTP_500_INTERNAL: &str = "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: 21\r\nConnection: close\r\n\r\nInternal Server Error";
const HTTP_504_GATEWAY_TIMEOUT: &str = "HTTP/1.1 504 Gateway Timeout\r\nContent-Type: text/plain\r\nContent-Length: 15\r\nConnection: close\r\n\r\nGateway Timeout";

/// Constant-time string comparison to avoid timing attacks on secret checks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Incoming webhook payload. Only `content` is required.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    sender: String,
    content: String,
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    session_key: String,
}

/// A parsed HTTP request (the subset this channel cares about).
#[derive(Debug)]
struct ParsedHttpRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl ParsedHttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parses a raw HTTP request. Returns `None` on malformed input.
fn parse_http_request(raw: &str) -> Option<ParsedHttpRequest> {
    let (head, body) = raw.split_once("\r\n\r\n")?;
    let mut lines = head.lines();

    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Some(ParsedHttpRequest {
        method,
        path,
        headers,
        body: body.to_string(),
    })
}

/// Finds the end of the header section (the `\r\n\r\n` separator) in a buffer.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Extracts the Content-Length value from a raw header section.
fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Checks the `Authorization: Bearer <secret>` header against the configured
/// secret. No configured secret means all requests pass.
fn validate_auth(req: &ParsedHttpRequest, secret: Option<&str>) -> bool {
    let Some(expected) = secret else {
        return true;
    };
    match req.header("authorization") {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => constant_time_eq(token, expected),
            None => false,
        },
        None => false,
    }
}

fn ok_json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// Configuration for the webhook channel.
#[derive(Debug, Clone)]
pub struct WebhookChannelConfig {
    /// Address to bind the listener to
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// URL path that accepts webhook POSTs
    pub path: String,
    /// Optional shared secret required as `Authorization: Bearer <secret>`
    pub secret: Option<String>,
}

impl Default for WebhookChannelConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 18791,
            path: "/webhook".to_string(),
            secret: None,
        }
    }
}

/// State shared between the channel handle and its connection tasks.
struct WebhookShared {
    base: BaseChannelConfig,
    path: String,
    secret: Option<String>,
    bus: Arc<MessageBus>,
    correlator: Arc<ResponseCorrelator>,
}

/// HTTP webhook channel with synchronous request/reply correlation.
pub struct WebhookChannel {
    config: WebhookChannelConfig,
    shared: Arc<WebhookShared>,
    running: Arc<AtomicBool>,
    shutdown_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    bound_addr: Arc<std::sync::Mutex<Option<SocketAddr>>>,
}

impl WebhookChannel {
    pub fn new(
        config: WebhookChannelConfig,
        base: BaseChannelConfig,
        bus: Arc<MessageBus>,
        correlator: Arc<ResponseCorrelator>,
    ) -> Self {
        Self {
            shared: Arc::new(WebhookShared {
                base,
                path: config.path.clone(),
                secret: config.secret.clone(),
                bus,
                correlator,
            }),
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: std::sync::Mutex::new(None),
            bound_addr: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Builds a channel from the application [`WebhookConfig`] section.
    pub fn from_config(
        cfg: &WebhookConfig,
        bus: Arc<MessageBus>,
        correlator: Arc<ResponseCorrelator>,
    ) -> Self {
        let channel_config = WebhookChannelConfig {
            bind_address: cfg.host.clone(),
            port: cfg.port,
            path: cfg.path.clone(),
            secret: cfg.secret.clone(),
        };
        let base = BaseChannelConfig::with_allowlist("webhook", cfg.allow_from.clone());
        Self::new(channel_config, base, bus, correlator)
    }

    /// The address the listener actually bound to, once started.
    ///
    /// Differs from the configured address when port 0 was requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .bound_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Signals the listener to stop accepting connections.
    ///
    /// Shared-reference counterpart of [`Channel::stop`], for callers that
    /// hold the channel behind an `Arc` (the gateway's dispatch loop does).
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }

    /// Reads one HTTP request, runs it through validation, and answers it.
    async fn handle_connection(
        mut stream: tokio::net::TcpStream,
        remote: SocketAddr,
        shared: Arc<WebhookShared>,
    ) {
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        let mut chunk = [0u8; 4096];

        // Read until the full header section plus the declared body is in.
        let raw = loop {
            let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk)).await;
            let n = match read {
                Ok(Ok(0)) => break None,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!("Webhook read error from {}: {}", remote, e);
                    break None;
                }
                Err(_) => {
                    debug!("Webhook read timeout from {}", remote);
                    break None;
                }
            };
            buf.extend_from_slice(&chunk[..n]);

            match find_header_end(&buf) {
                Some(header_end) => {
                    let head = String::from_utf8_lossy(&buf[..header_end]);
                    let body_len = content_length(&head);
                    if body_len > MAX_BODY_SIZE {
                        let _ = stream.write_all(HTTP_413_PAYLOAD_TOO_LARGE.as_bytes()).await;
                        return;
                    }
                    if buf.len() >= header_end + body_len {
                        break Some(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
                None => {
                    if buf.len() > MAX_HEADER_SIZE {
                        let _ = stream.write_all(HTTP_413_PAYLOAD_TOO_LARGE.as_bytes()).await;
                        return;
                    }
                }
            }
        };

        let Some(raw) = raw else {
            return;
        };

        let response = Self::handle_request(&raw, remote, &shared).await;
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            debug!("Webhook write error to {}: {}", remote, e);
        }
        let _ = stream.shutdown().await;
    }

    /// Validates a parsed request, publishes it inbound, and waits for the
    /// correlated reply. Returns the full HTTP response to write back.
    async fn handle_request(raw: &str, remote: SocketAddr, shared: &WebhookShared) -> String {
        let Some(req) = parse_http_request(raw) else {
            return HTTP_400_BAD_REQUEST.to_string();
        };

        if req.method != "POST" {
            return HTTP_405_METHOD_NOT_ALLOWED.to_string();
        }

        // Ignore any query string when matching the path.
        let path = req.path.split('?').next().unwrap_or("");
        if path != shared.path {
            return HTTP_404_NOT_FOUND.to_string();
        }

        if !validate_auth(&req, shared.secret.as_deref()) {
            warn!("Webhook auth failure from {}", remote);
            return HTTP_401_UNAUTHORIZED.to_string();
        }

        let payload: WebhookPayload = match serde_json::from_str(&req.body) {
            Ok(p) => p,
            Err(e) => {
                debug!("Webhook bad payload from {}: {}", remote, e);
                return HTTP_400_BAD_REQUEST.to_string();
            }
        };
        if payload.content.is_empty() {
            return HTTP_400_BAD_REQUEST.to_string();
        }

        let sender = if payload.sender.is_empty() {
            "webhook-user".to_string()
        } else {
            payload.sender
        };

        if !shared.base.is_allowed(&sender) {
            warn!("Webhook sender {} not in allowlist", sender);
            return HTTP_401_UNAUTHORIZED.to_string();
        }

        // Mint a per-request chat id when the caller supplies none; it keys
        // the correlator slot, so it must be unique among in-flight requests.
        let chat_id = if payload.chat_id.is_empty() {
            format!("hook-{}", Uuid::new_v4())
        } else {
            payload.chat_id
        };

        // History is keyed by sender by default, so repeat callers that let
        // the chat id be minted still share one conversation.
        let session_key = if payload.session_key.is_empty() {
            format!("webhook:{}", sender)
        } else {
            payload.session_key
        };

        // Register before publishing so a fast reply cannot race the slot.
        // The guard frees the slot on every non-delivery exit, including
        // cancellation of this connection task.
        let (rx, _slot) = match shared.correlator.register_with_guard(&chat_id) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Webhook correlation slot for {} unavailable: {}", chat_id, e);
                return HTTP_500_INTERNAL.to_string();
            }
        };

        let inbound = InboundMessage::new("webhook", &sender, &chat_id, &payload.content)
            .with_session_key(&session_key)
            .with_metadata("remote_addr", &remote.to_string());

        info!("Webhook message from {} (chat {})", sender, chat_id);

        if shared.bus.publish_inbound(inbound).await.is_err() {
            error!("Webhook failed to publish inbound message: bus closed");
            return HTTP_500_INTERNAL.to_string();
        }

        match tokio::time::timeout(RESPONSE_TIMEOUT, rx).await {
            Ok(Ok(content)) => {
                let body = serde_json::json!({
                    "response": content,
                    "chat_id": chat_id,
                })
                .to_string();
                ok_json_response(&body)
            }
            Ok(Err(_)) => {
                // Slot was removed externally without a delivery.
                warn!("Webhook wait for chat {} was cancelled", chat_id);
                HTTP_500_INTERNAL.to_string()
            }
            Err(_) => {
                warn!("Webhook timed out waiting for reply to chat {}", chat_id);
                HTTP_504_GATEWAY_TIMEOUT.to_string()
            }
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        &self.shared.base.name
    }

    async fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            self.running.store(false, Ordering::SeqCst);
            MaruError::Channel(format!("Webhook failed to bind {}: {}", addr, e))
        })?;

        let local = listener
            .local_addr()
            .map_err(|e| MaruError::Channel(format!("Webhook listener address: {}", e)))?;
        {
            let mut bound = self
                .bound_addr
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *bound = Some(local);
        }
        info!("Webhook channel listening on http://{}{}", local, self.shared.path);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        {
            let mut slot = self
                .shutdown_tx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(shutdown_tx);
        }

        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Webhook channel shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, remote)) => {
                                let shared = Arc::clone(&shared);
                                tokio::spawn(async move {
                                    WebhookChannel::handle_connection(stream, remote, shared).await;
                                });
                            }
                            Err(e) => {
                                error!("Webhook accept error: {}", e);
                            }
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    /// Delivers a reply to the HTTP caller waiting on this chat id.
    ///
    /// Typing signals are ignored: a parked HTTP request has no way to show
    /// a liveness indicator. A reply with no waiter (the caller already timed
    /// out) is dropped.
    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        if msg.is_typing() {
            return Ok(());
        }
        if !self.shared.correlator.deliver(&msg.chat_id, &msg.content) {
            debug!("Webhook reply for chat {} had no waiter", msg.chat_id);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_allowed(&self, user_id: &str) -> bool {
        self.shared.base.is_allowed(user_id)
    }
}
