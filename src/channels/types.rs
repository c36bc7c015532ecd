//! Channel trait and shared channel types.
//!
//! A channel is a transport adapter: it receives user messages and publishes
//! them to the message bus, and delivers agent replies back to the user.

use async_trait::async_trait;

use crate::bus::OutboundMessage;
use crate::error::Result;

/// Interface implemented by every transport adapter.
///
/// Channels are responsible for:
/// - Receiving messages from users and publishing them to the message bus
/// - Delivering outbound messages from the agent back to users
/// - Managing their connection lifecycle (start/stop)
/// - Enforcing access control via allowlists
///
/// # Example Implementation
///
/// ```ignore
/// use async_trait::async_trait;
/// use maru::channels::{Channel, BaseChannelConfig};
/// use maru::bus::OutboundMessage;
/// use maru::error::Result;
///
/// struct MyChannel {
///     config: BaseChannelConfig,
///     running: bool,
/// }
///
/// #[async_trait]
/// impl Channel for MyChannel {
///     fn name(&self) -> &str {
///         &self.config.name
///     }
///
///     async fn start(&mut self) -> Result<()> {
///         self.running = true;
///         Ok(())
///     }
///
///     async fn stop(&mut self) -> Result<()> {
///         self.running = false;
///         Ok(())
///     }
///
///     async fn send(&self, msg: &OutboundMessage) -> Result<()> {
///         println!("Sending: {}", msg.content);
///         Ok(())
///     }
///
///     fn is_running(&self) -> bool {
///         self.running
///     }
///
///     fn is_allowed(&self, user_id: &str) -> bool {
///         self.config.is_allowed(user_id)
///     }
/// }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Returns the unique name of this channel (e.g., "webhook").
    ///
    /// This name is used for routing messages and logging purposes.
    fn name(&self) -> &str;

    /// Starts the channel and begins listening for incoming messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails to start (e.g., the listen
    /// address is already in use).
    async fn start(&mut self) -> Result<()>;

    /// Stops the channel, cleaning up resources and closing connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails to stop cleanly.
    async fn stop(&mut self) -> Result<()>;

    /// Delivers an outbound message through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered (e.g., no
    /// recipient is waiting, network failure).
    async fn send(&self, msg: &OutboundMessage) -> Result<()>;

    /// Returns whether the channel is currently running and accepting messages.
    fn is_running(&self) -> bool;

    /// Checks if a user is allowed to use this channel.
    fn is_allowed(&self, user_id: &str) -> bool;
}

/// Base configuration shared by all channels.
///
/// # Example
///
/// ```
/// use maru::channels::BaseChannelConfig;
///
/// let config = BaseChannelConfig {
///     name: "webhook".to_string(),
///     allowlist: vec!["user123".to_string(), "user456".to_string()],
/// };
///
/// assert!(config.is_allowed("user123"));
/// assert!(!config.is_allowed("user789"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BaseChannelConfig {
    /// The unique name of this channel
    pub name: String,
    /// List of allowed user IDs. If empty, all users are allowed.
    pub allowlist: Vec<String>,
}

impl BaseChannelConfig {
    /// Creates a new `BaseChannelConfig` with the given name and an empty
    /// allowlist. An empty allowlist means all users are allowed.
    ///
    /// # Example
    ///
    /// ```
    /// use maru::channels::BaseChannelConfig;
    ///
    /// let config = BaseChannelConfig::new("webhook");
    /// assert!(config.is_allowed("anyone")); // Empty allowlist = allow all
    /// ```
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            allowlist: Vec::new(),
        }
    }

    /// Creates a new `BaseChannelConfig` with the given name and allowlist.
    ///
    /// # Example
    ///
    /// ```
    /// use maru::channels::BaseChannelConfig;
    ///
    /// let config = BaseChannelConfig::with_allowlist("webhook", vec!["user1".to_string()]);
    /// assert!(config.is_allowed("user1"));
    /// assert!(!config.is_allowed("user2"));
    /// ```
    pub fn with_allowlist(name: &str, allowlist: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            allowlist,
        }
    }

    /// Checks if a user is allowed based on the allowlist.
    ///
    /// If the allowlist is empty, all users are allowed.
    pub fn is_allowed(&self, user_id: &str) -> bool {
        self.allowlist.is_empty() || self.allowlist.contains(&user_id.to_string())
    }
}
