//! Channels module - transport adapters between users and the message bus.
//!
//! Channels receive messages from users, publish them to the bus as inbound
//! messages, and deliver the agent's outbound replies back to the user.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                                                      │
//! │   ┌─────────┐                         ┌─────────┐    │
//! │   │ Webhook │        implements       │   CLI   │    │
//! │   └────┬────┘         Channel         └────┬────┘    │
//! │        │               trait               │         │
//! │        └──────────────┬────────────────────┘         │
//! │                       │                              │
//! │                 ┌─────┴─────┐                        │
//! │                 │MessageBus │                        │
//! │                 │ (inbound/ │                        │
//! │                 │ outbound) │                        │
//! │                 └───────────┘                        │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The webhook channel is synchronous: the HTTP request that delivers an
//! inbound message stays open until the agent's reply comes back through the
//! [`ResponseCorrelator`](crate::bus::ResponseCorrelator). The CLI bypasses
//! channels entirely via `AgentLoop::process_direct`.
//!
//! # Implementing a New Channel
//!
//! Create a struct that implements the [`Channel`] trait:
//!
//! ```ignore
//! use async_trait::async_trait;
//! use maru::channels::{Channel, BaseChannelConfig};
//! use maru::bus::{MessageBus, OutboundMessage};
//! use maru::error::Result;
//! use std::sync::Arc;
//!
//! pub struct MyChannel {
//!     config: BaseChannelConfig,
//!     running: bool,
//!     bus: Arc<MessageBus>,
//! }
//!
//! #[async_trait]
//! impl Channel for MyChannel {
//!     fn name(&self) -> &str {
//!         &self.config.name
//!     }
//!
//!     async fn start(&mut self) -> Result<()> {
//!         self.running = true;
//!         // Start listening for messages...
//!         Ok(())
//!     }
//!
//!     async fn stop(&mut self) -> Result<()> {
//!         self.running = false;
//!         Ok(())
//!     }
//!
//!     async fn send(&self, msg: &OutboundMessage) -> Result<()> {
//!         // Deliver via your channel's wire protocol...
//!         Ok(())
//!     }
//!
//!     fn is_running(&self) -> bool {
//!         self.running
//!     }
//!
//!     fn is_allowed(&self, user_id: &str) -> bool {
//!         self.config.is_allowed(user_id)
//!     }
//! }
//! ```

mod types;
pub mod webhook;

pub use types::{BaseChannelConfig, Channel};
pub use webhook::{WebhookChannel, WebhookChannelConfig};
