//! Message types for the Maru message bus
//!
//! This module defines the core message types exchanged between transport
//! channels, the agent loop, and the message bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Represents an incoming message from a channel (e.g., webhook, CLI).
///
/// Immutable once constructed: the agent loop consumes it exactly once and
/// never writes back into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Unique identifier for this message (UUID v4)
    pub id: String,
    /// The channel this message came from (e.g., "webhook", "cli")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// Optional media attachment
    pub media: Option<MediaAttachment>,
    /// Session key for history routing (format: "channel:chat_id")
    pub session_key: String,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
    /// When the message entered the system
    pub timestamp: DateTime<Utc>,
}

/// What an outbound message asks the transport to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAction {
    /// Deliver the content as a reply to the chat
    Reply,
    /// Show a liveness/typing indicator; content is empty
    Typing,
}

/// Represents an outgoing message or signal to be sent via a channel.
///
/// Produced only by the agent loop; consumed by exactly one of a waiting
/// response-correlator slot or a channel's send path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send (empty for typing signals)
    pub content: String,
    /// What the transport should do with this message
    pub action: MessageAction,
}

/// Represents a media attachment (image, audio, video, or document)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// The type of media
    pub media_type: MediaType,
    /// URL to the media (if hosted remotely)
    pub url: Option<String>,
    /// Original filename
    pub filename: Option<String>,
}

/// Types of media that can be attached to messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaType {
    /// Image files (PNG, JPG, GIF, etc.)
    Image,
    /// Audio files (MP3, WAV, OGG, etc.)
    Audio,
    /// Video files (MP4, WebM, etc.)
    Video,
    /// Document files (PDF, DOCX, etc.)
    Document,
}

impl InboundMessage {
    /// Creates a new inbound message with the required fields.
    ///
    /// The session key is automatically generated as "channel:chat_id".
    ///
    /// # Example
    /// ```
    /// use maru::bus::message::InboundMessage;
    ///
    /// let msg = InboundMessage::new("webhook", "alice", "hook-1", "Hello, bot!");
    /// assert_eq!(msg.session_key, "webhook:hook-1");
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media: None,
            session_key: format!("{}:{}", channel, chat_id),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Overrides the derived session key (builder pattern).
    ///
    /// Transports that key history by sender rather than by chat (e.g. the
    /// webhook channel, which mints a fresh chat id per request) use this.
    pub fn with_session_key(mut self, session_key: &str) -> Self {
        self.session_key = session_key.to_string();
        self
    }

    /// Attaches media to the message (builder pattern).
    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = Some(media);
        self
    }

    /// Adds a metadata key-value pair to the message (builder pattern).
    ///
    /// # Example
    /// ```
    /// use maru::bus::message::InboundMessage;
    ///
    /// let msg = InboundMessage::new("webhook", "alice", "hook-1", "Hello")
    ///     .with_metadata("remote_addr", "127.0.0.1");
    /// assert_eq!(msg.metadata.get("remote_addr"), Some(&"127.0.0.1".to_string()));
    /// ```
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Checks if this message has any media attached.
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

impl OutboundMessage {
    /// Creates a new reply message.
    ///
    /// # Example
    /// ```
    /// use maru::bus::message::{MessageAction, OutboundMessage};
    ///
    /// let msg = OutboundMessage::new("webhook", "hook-1", "Hello back!");
    /// assert_eq!(msg.action, MessageAction::Reply);
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            action: MessageAction::Reply,
        }
    }

    /// Creates a typing signal for a chat. Carries no content.
    pub fn typing(channel: &str, chat_id: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: String::new(),
            action: MessageAction::Typing,
        }
    }

    /// Creates a reply to an inbound message.
    ///
    /// # Example
    /// ```
    /// use maru::bus::message::{InboundMessage, OutboundMessage};
    ///
    /// let inbound = InboundMessage::new("webhook", "alice", "hook-1", "Hello");
    /// let response = OutboundMessage::reply_to(&inbound, "Hello back!");
    /// assert_eq!(response.channel, "webhook");
    /// assert_eq!(response.chat_id, "hook-1");
    /// ```
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        Self::new(&msg.channel, &msg.chat_id, content)
    }

    /// Creates a typing signal matching an inbound message's chat.
    pub fn typing_for(msg: &InboundMessage) -> Self {
        Self::typing(&msg.channel, &msg.chat_id)
    }

    /// Whether this message is a typing/liveness signal rather than a reply.
    pub fn is_typing(&self) -> bool {
        self.action == MessageAction::Typing
    }
}

impl MediaAttachment {
    /// Creates a new media attachment of the specified type.
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            url: None,
            filename: None,
        }
    }

    /// Sets the URL for the media (builder pattern).
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Sets the filename (builder pattern).
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("webhook", "alice", "hook-1", "Hello");
        assert_eq!(msg.channel, "webhook");
        assert_eq!(msg.sender_id, "alice");
        assert_eq!(msg.chat_id, "hook-1");
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.session_key, "webhook:hook-1");
        assert!(msg.media.is_none());
        assert!(msg.metadata.is_empty());
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_inbound_session_key_override() {
        let msg = InboundMessage::new("webhook", "alice", "hook-99", "Hi")
            .with_session_key("webhook:alice");
        assert_eq!(msg.session_key, "webhook:alice");
        assert_eq!(msg.chat_id, "hook-99");
    }

    #[test]
    fn test_inbound_message_with_media() {
        let media = MediaAttachment::new(MediaType::Image)
            .with_url("https://example.com/image.png")
            .with_filename("image.png");

        let msg = InboundMessage::new("webhook", "alice", "hook-1", "Check this").with_media(media);

        assert!(msg.has_media());
        let attachment = msg.media.unwrap();
        assert_eq!(attachment.media_type, MediaType::Image);
        assert_eq!(
            attachment.url,
            Some("https://example.com/image.png".to_string())
        );
    }

    #[test]
    fn test_outbound_reply_creation() {
        let msg = OutboundMessage::new("webhook", "hook-1", "Response");
        assert_eq!(msg.channel, "webhook");
        assert_eq!(msg.chat_id, "hook-1");
        assert_eq!(msg.content, "Response");
        assert_eq!(msg.action, MessageAction::Reply);
        assert!(!msg.is_typing());
    }

    #[test]
    fn test_outbound_typing_signal() {
        let msg = OutboundMessage::typing("webhook", "hook-1");
        assert!(msg.is_typing());
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_typing_for_inbound() {
        let inbound = InboundMessage::new("webhook", "alice", "hook-1", "Hello");
        let typing = OutboundMessage::typing_for(&inbound);
        assert_eq!(typing.channel, "webhook");
        assert_eq!(typing.chat_id, "hook-1");
        assert_eq!(typing.action, MessageAction::Typing);
    }

    #[test]
    fn test_outbound_reply_to_inbound() {
        let inbound = InboundMessage::new("webhook", "alice", "hook-1", "Hello");
        let response = OutboundMessage::reply_to(&inbound, "Hello back!");

        assert_eq!(response.channel, "webhook");
        assert_eq!(response.chat_id, "hook-1");
        assert_eq!(response.content, "Hello back!");
        assert_eq!(response.action, MessageAction::Reply);
    }

    #[test]
    fn test_action_tag_serialization() {
        let msg = OutboundMessage::typing("webhook", "hook-1");
        let json = serde_json::to_value(&msg).expect("Failed to serialize");
        assert_eq!(json["action"], "typing");

        let msg = OutboundMessage::new("webhook", "hook-1", "hi");
        let json = serde_json::to_value(&msg).expect("Failed to serialize");
        assert_eq!(json["action"], "reply");
    }

    #[test]
    fn test_inbound_serialization_round_trip() {
        let msg = InboundMessage::new("webhook", "alice", "hook-1", "Hello")
            .with_metadata("key", "value");

        let json = serde_json::to_string(&msg).expect("Failed to serialize");
        let deserialized: InboundMessage =
            serde_json::from_str(&json).expect("Failed to deserialize");

        assert_eq!(deserialized.channel, "webhook");
        assert_eq!(deserialized.content, "Hello");
        assert_eq!(deserialized.metadata.get("key"), Some(&"value".to_string()));
    }
}
