//! Message Bus Module
//!
//! This module provides the message bus at the center of Maru: a mediator
//! carrying inbound requests from transport channels to the agent loop and
//! outbound replies/signals back to transports. It also hosts the
//! [`ResponseCorrelator`] used by synchronous transports (webhook) to block
//! until the matching reply arrives.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────>│  MessageBus │────>│  AgentLoop  │
//! │  (webhook)  │     │  (inbound)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            │ outbound (replies + typing)
//!                            ▼
//! ┌─────────────┐     ┌─────────────┐
//! │   Channel   │<────│  MessageBus │
//! │  (webhook)  │     │  (outbound) │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! Delivery is best-effort and at-most-once: there is no durability, and
//! unconsumed messages are lost on process termination.

pub mod correlator;
pub mod message;

pub use correlator::{ResponseCorrelator, SlotGuard};
pub use message::{InboundMessage, MediaAttachment, MediaType, MessageAction, OutboundMessage};

use crate::error::{MaruError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Default buffer size for message channels
const DEFAULT_BUFFER_SIZE: usize = 100;

/// The central message bus routing messages between channels and the agent.
///
/// The `MessageBus` maintains two separate queues:
/// - **Inbound**: messages from channels to the agent loop
/// - **Outbound**: replies and typing signals from the agent back to channels
///
/// Both are async MPSC queues backed by Tokio. FIFO ordering holds within a
/// single producer-consumer pair; no ordering is guaranteed across chats.
pub struct MessageBus {
    /// Sender for inbound messages
    inbound_tx: mpsc::Sender<InboundMessage>,
    /// Receiver for inbound messages (wrapped in Arc<Mutex> for shared access)
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    /// Sender for outbound messages
    outbound_tx: mpsc::Sender<OutboundMessage>,
    /// Receiver for outbound messages (wrapped in Arc<Mutex> for shared access)
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
}

impl MessageBus {
    /// Creates a new `MessageBus` with the default buffer size (100 messages
    /// in each direction).
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a new `MessageBus` with a custom buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        }
    }

    /// Publishes an inbound message to the bus.
    ///
    /// Called by channel adapters when they receive a message from a user.
    /// Suspends while the buffer is full.
    ///
    /// # Errors
    /// Returns `MaruError::BusClosed` if the receiver has been dropped.
    ///
    /// # Example
    /// ```
    /// use maru::bus::{MessageBus, InboundMessage};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let bus = MessageBus::new();
    ///     let msg = InboundMessage::new("webhook", "alice", "hook-1", "Hello");
    ///     bus.publish_inbound(msg).await.unwrap();
    /// }
    /// ```
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| MaruError::BusClosed)
    }

    /// Consumes the next inbound message from the bus.
    ///
    /// Suspends the caller until a message is available. Cancellation is the
    /// caller's concern: the agent loop races this against its shutdown
    /// signal in a `tokio::select!`.
    ///
    /// # Returns
    /// - `Some(InboundMessage)` if a message is available
    /// - `None` if the channel is closed (all senders dropped)
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Publishes an outbound message (reply or typing signal) to the bus.
    ///
    /// # Errors
    /// Returns `MaruError::BusClosed` if the receiver has been dropped.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| MaruError::BusClosed)
    }

    /// Consumes the next outbound message from the bus.
    ///
    /// Called by the channel dispatch loop waiting for replies to deliver.
    ///
    /// # Returns
    /// - `Some(OutboundMessage)` if a message is available
    /// - `None` if the channel is closed (all senders dropped)
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Returns a clone of the inbound message sender.
    ///
    /// Useful for handing each channel its own sender to publish with.
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound_tx.clone()
    }

    /// Returns a clone of the outbound message sender.
    pub fn outbound_sender(&self) -> mpsc::Sender<OutboundMessage> {
        self.outbound_tx.clone()
    }

    /// Tries to publish an inbound message without blocking.
    ///
    /// # Returns
    /// - `Ok(())` if the message was successfully queued
    /// - `Err(MaruError::BusClosed)` if the channel is closed
    /// - `Err(MaruError::Channel)` if the buffer is full
    pub fn try_publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                MaruError::Channel("inbound buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => MaruError::BusClosed,
        })
    }

    /// Tries to publish an outbound message without blocking.
    pub fn try_publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                MaruError::Channel("outbound buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => MaruError::BusClosed,
        })
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones the message bus, sharing the same underlying channels.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
        }
    }
}
