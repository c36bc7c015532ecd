//! Response correlation for synchronous transports
//!
//! A webhook handler must hand its HTTP caller a reply that is only produced
//! asynchronously, when the agent loop publishes an outbound message for the
//! same chat id. The [`ResponseCorrelator`] owns the map of pending waiters
//! exclusively: external code can only `register`, `deliver`, or wait, so the
//! slot lifecycle (removed exactly once, by whichever of delivery / timeout /
//! cancellation fires first) cannot be violated from outside.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{MaruError, Result};

/// Matches asynchronous replies back to the synchronous callers waiting for
/// them, keyed by chat id.
///
/// At most one pending slot exists per chat id at any time. The slot map is
/// guarded by a single mutex with short critical sections; the waiting itself
/// happens outside the lock on a oneshot channel.
pub struct ResponseCorrelator {
    slots: Mutex<HashMap<String, oneshot::Sender<String>>>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a pending slot for `chat_id` and returns the receiving end.
    ///
    /// Must be called before the turn is triggered, otherwise a fast reply
    /// could arrive with no slot to land in.
    ///
    /// # Errors
    /// Returns `MaruError::Channel` if a slot for this chat id already exists.
    pub fn register(&self, chat_id: &str) -> Result<oneshot::Receiver<String>> {
        let mut slots = self.lock_slots();
        if slots.contains_key(chat_id) {
            return Err(MaruError::Channel(format!(
                "duplicate pending response slot for chat {}",
                chat_id
            )));
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(chat_id.to_string(), tx);
        Ok(rx)
    }

    /// Delivers `content` to the waiter for `chat_id`, removing the slot.
    ///
    /// Returns `true` if a waiter was found. A late delivery after the waiter
    /// timed out finds no slot and is silently dropped — accepted at-most-once
    /// loss for synchronous transports.
    pub fn deliver(&self, chat_id: &str, content: &str) -> bool {
        let sender = self.lock_slots().remove(chat_id);
        match sender {
            // The receiver may already be gone; either way the slot is freed.
            Some(tx) => tx.send(content.to_string()).is_ok(),
            None => false,
        }
    }

    /// Removes the slot for `chat_id` without delivering. Idempotent.
    ///
    /// Returns `true` if a slot was present.
    pub fn remove(&self, chat_id: &str) -> bool {
        self.lock_slots().remove(chat_id).is_some()
    }

    /// Whether a pending slot currently exists for `chat_id`.
    pub fn has_pending(&self, chat_id: &str) -> bool {
        self.lock_slots().contains_key(chat_id)
    }

    /// Number of pending slots across all chats.
    pub fn pending_count(&self) -> usize {
        self.lock_slots().len()
    }

    /// Registers a slot and returns the receiver together with a guard that
    /// removes the slot when dropped.
    ///
    /// For callers that need to do work between registration and waiting
    /// (e.g. publish the message that will eventually produce the reply).
    /// The guard makes cleanup unconditional: timeout, error return, and
    /// task cancellation all release the slot.
    ///
    /// # Errors
    /// Returns `MaruError::Channel` if a slot for this chat id already exists.
    pub fn register_with_guard(
        &self,
        chat_id: &str,
    ) -> Result<(oneshot::Receiver<String>, SlotGuard<'_>)> {
        let rx = self.register(chat_id)?;
        let guard = SlotGuard {
            correlator: self,
            chat_id: chat_id.to_string(),
        };
        Ok((rx, guard))
    }

    /// Registers a slot for `chat_id` and waits up to `timeout` for delivery.
    ///
    /// Exactly one of delivery, timeout, or caller cancellation (dropping
    /// this future) removes the slot: delivery takes it out of the map before
    /// sending, and the guard covers the other two paths.
    ///
    /// # Errors
    /// - `MaruError::Channel` if a slot for this chat id already exists
    /// - `MaruError::CorrelationTimeout` if no reply arrives in time
    pub async fn await_response(&self, chat_id: &str, timeout: Duration) -> Result<String> {
        let (rx, _guard) = self.register_with_guard(chat_id)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(content)) => Ok(content),
            // Sender dropped without sending: the slot was removed externally.
            Ok(Err(_)) => Err(MaruError::Channel(format!(
                "pending response slot for chat {} was cancelled",
                chat_id
            ))),
            Err(_) => Err(MaruError::CorrelationTimeout(chat_id.to_string())),
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<String>>> {
        // Slot senders cannot poison the lock in practice; recover if they do.
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ResponseCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the slot when the holder exits by any path other than delivery
/// (timeout, error, or drop). No-op if delivery already removed it.
pub struct SlotGuard<'a> {
    correlator: &'a ResponseCorrelator,
    chat_id: String,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.correlator.remove(&self.chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deliver_wakes_waiter() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let waiter = Arc::clone(&correlator);

        let handle = tokio::spawn(async move {
            waiter
                .await_response("hook-1", Duration::from_secs(5))
                .await
        });

        // Let the waiter register its slot first.
        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(correlator.deliver("hook-1", "12.3 cm"));
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, "12.3 cm");
        assert!(!correlator.has_pending("hook-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_slot_and_late_delivery_is_dropped() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let waiter = Arc::clone(&correlator);

        let handle = tokio::spawn(async move {
            waiter.await_response("X", Duration::from_secs(60)).await
        });

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(MaruError::CorrelationTimeout(_))));
        assert!(!correlator.has_pending("X"));

        // A reply arriving after the timeout finds no slot and is dropped.
        assert!(!correlator.deliver("X", "too late"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let correlator = ResponseCorrelator::new();
        let _rx = correlator.register("hook-1").unwrap();

        let second = correlator.register("hook-1");
        assert!(matches!(second, Err(MaruError::Channel(_))));
        assert_eq!(correlator.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_slot_count_zero_or_one() {
        let correlator = ResponseCorrelator::new();
        assert_eq!(correlator.pending_count(), 0);

        let _rx = correlator.register("hook-1").unwrap();
        assert_eq!(correlator.pending_count(), 1);

        correlator.deliver("hook-1", "done");
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_removes_slot() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let waiter = Arc::clone(&correlator);

        let handle = tokio::spawn(async move {
            let _ = waiter.await_response("hook-1", Duration::from_secs(60)).await;
        });

        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Dropping the waiting future must release the slot.
        handle.abort();
        let _ = handle.await;
        assert!(!correlator.has_pending("hook-1"));
    }

    #[tokio::test]
    async fn test_guarded_registration_releases_slot_on_abort() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let waiter = Arc::clone(&correlator);

        let handle = tokio::spawn(async move {
            let (rx, _slot) = waiter.register_with_guard("hook-1").unwrap();
            let _ = rx.await;
        });

        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Killing the task while it is parked on the receiver must still
        // free the slot.
        handle.abort();
        let _ = handle.await;
        assert!(!correlator.has_pending("hook-1"));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let correlator = ResponseCorrelator::new();
        let _rx = correlator.register("hook-1").unwrap();

        assert!(correlator.remove("hook-1"));
        assert!(!correlator.remove("hook-1"));
    }

    #[tokio::test]
    async fn test_independent_chats() {
        let correlator = ResponseCorrelator::new();
        let rx_a = correlator.register("a").unwrap();
        let _rx_b = correlator.register("b").unwrap();

        assert!(correlator.deliver("a", "for a"));
        assert_eq!(rx_a.await.unwrap(), "for a");
        assert!(correlator.has_pending("b"));
    }
}
