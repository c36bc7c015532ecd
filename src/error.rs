//! Error types for Maru
//!
//! This module defines all error types used throughout the Maru runtime.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for Maru operations.
#[derive(Error, Debug)]
pub enum MaruError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider errors (API failures, malformed responses, auth, etc.).
    /// Fatal to the current turn; never retried by the turn engine.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Channel errors (connection failures, message routing issues, etc.)
    #[error("Channel error: {0}")]
    Channel(String),

    /// A tool call named a capability the registry does not hold.
    /// Recovered by the turn engine into a tool-result text, never fatal.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution failed (bad arguments, script failure, timeout, etc.).
    /// Recovered by the turn engine into a tool-result text, never fatal.
    #[error("Tool error: {0}")]
    ToolExecution(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Message bus channel closed unexpectedly
    #[error("Bus error: channel closed")]
    BusClosed,

    /// A synchronous waiter gave up before a reply arrived.
    /// The underlying turn may still complete; its answer is discarded.
    #[error("Correlation timeout: no reply for chat {0}")]
    CorrelationTimeout(String),
}

/// A specialized `Result` type for Maru operations.
pub type Result<T> = std::result::Result<T, MaruError>;
