//! Session module - conversation history storage
//!
//! This module provides session management for Maru, including:
//! - In-memory session storage with async access
//! - File-based persistence, one JSON file per session key
//! - Append/history/persist operations with per-key write serialization
//!
//! # Example
//!
//! ```
//! use maru::session::{SessionManager, Message};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new_memory();
//!
//!     manager.append("webhook:alice", Message::user("Hello!")).await.unwrap();
//!     manager.append("webhook:alice", Message::assistant("Hi there!")).await.unwrap();
//!     manager.persist("webhook:alice").await.unwrap();
//!
//!     let history = manager.history("webhook:alice").await.unwrap();
//!     assert_eq!(history.len(), 2);
//! }
//! ```

pub mod types;

pub use types::{Message, Role, Session, ToolCall};

use crate::config::Config;
use crate::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Session manager for storing and retrieving conversation histories.
///
/// The `SessionManager` provides in-memory caching and optional file-based
/// persistence. Sessions are identified by unique keys (e.g.,
/// "webhook:alice").
///
/// # Thread Safety
///
/// The manager uses `Arc<RwLock>` internally, making it safe to clone and
/// share across async tasks. Appends and persists for the same key are
/// serialized by the write lock; operations on different keys proceed
/// independently.
///
/// # Persistence
///
/// When created with `new()`, sessions are persisted under
/// `~/.maru/sessions/`. Use `new_memory()` for testing or when persistence
/// is not needed.
pub struct SessionManager {
    /// In-memory cache of sessions
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    /// Optional path for file-based persistence
    storage_path: Option<PathBuf>,
}

impl SessionManager {
    /// Create a new session manager persisting to `~/.maru/sessions/`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new() -> Result<Self> {
        let storage_path = Config::dir().join("sessions");
        std::fs::create_dir_all(&storage_path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(storage_path),
        })
    }

    /// Create an in-memory session manager without persistence.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
        }
    }

    /// Create a session manager with a custom storage path.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
        })
    }

    /// Get an existing session or create a new empty one.
    ///
    /// Checks the in-memory cache first, then disk (if persistence is
    /// enabled), and finally creates a fresh session lazily.
    pub async fn get_or_create(&self, key: &str) -> Result<Session> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(key) {
                return Ok(session.clone());
            }
        }

        if let Some(session) = self.load_from_disk(key).await? {
            return Ok(session);
        }

        let session = Session::new(key);
        let mut sessions = self.sessions.write().await;
        sessions.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// Get a session by key without creating it.
    pub async fn get(&self, key: &str) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(key) {
                return Ok(Some(session.clone()));
            }
        }

        self.load_from_disk(key).await
    }

    /// Return the ordered message history for `key` (empty if unseen).
    pub async fn history(&self, key: &str) -> Result<Vec<Message>> {
        match self.get(key).await? {
            Some(session) => Ok(session.messages),
            None => Ok(Vec::new()),
        }
    }

    /// Append a message to the session for `key`, creating it if needed.
    ///
    /// Appends for the same key are serialized by the store's write lock.
    /// The message only reaches disk on the next `persist(key)`.
    pub async fn append(&self, key: &str, message: Message) -> Result<()> {
        // Warm the cache from disk before taking the write lock.
        if !self.sessions.read().await.contains_key(key) {
            let _ = self.load_from_disk(key).await?;
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .add_message(message);
        Ok(())
    }

    /// Flush the session for `key` to durable storage.
    ///
    /// A no-op for unseen keys or when persistence is disabled.
    pub async fn persist(&self, key: &str) -> Result<()> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(key).cloned()
        };
        if let Some(session) = session {
            self.write_to_disk(&session).await?;
        }
        Ok(())
    }

    /// Save a session snapshot to both memory and disk.
    pub async fn save(&self, session: &Session) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.key.clone(), session.clone());
        }
        self.write_to_disk(session).await
    }

    /// Delete a session from both memory and disk.
    pub async fn delete(&self, key: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(key);
        }

        if let Some(ref storage_path) = self.storage_path {
            let file_path = storage_path.join(format!("{}.json", Self::sanitize_key(key)));
            if file_path.exists() {
                tokio::fs::remove_file(&file_path).await?;
            }
        }

        Ok(())
    }

    /// List all session keys, from memory and disk, sorted and deduplicated.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        {
            let sessions = self.sessions.read().await;
            keys.extend(sessions.keys().cloned());
        }

        // Read each session file for the actual key, not the sanitized filename.
        if let Some(ref storage_path) = self.storage_path {
            let mut dir_entries = tokio::fs::read_dir(storage_path).await?;
            while let Some(entry) = dir_entries.next_entry().await? {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    if let Ok(content) = tokio::fs::read_to_string(&path).await {
                        if let Ok(session) = serde_json::from_str::<Session>(&content) {
                            if !keys.contains(&session.key) {
                                keys.push(session.key);
                            }
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Check if a session exists in memory or on disk.
    pub async fn exists(&self, key: &str) -> bool {
        {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(key) {
                return true;
            }
        }

        if let Some(ref storage_path) = self.storage_path {
            let file_path = storage_path.join(format!("{}.json", Self::sanitize_key(key)));
            return file_path.exists();
        }

        false
    }

    /// Clear all sessions from memory (does not affect disk).
    pub async fn clear_cache(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }

    async fn load_from_disk(&self, key: &str) -> Result<Option<Session>> {
        if let Some(ref storage_path) = self.storage_path {
            let file_path = storage_path.join(format!("{}.json", Self::sanitize_key(key)));
            if file_path.exists() {
                let content = tokio::fs::read_to_string(&file_path).await?;
                let session: Session = serde_json::from_str(&content)?;

                let mut sessions = self.sessions.write().await;
                let cached = sessions
                    .entry(key.to_string())
                    .or_insert_with(|| session.clone());
                return Ok(Some(cached.clone()));
            }
        }
        Ok(None)
    }

    async fn write_to_disk(&self, session: &Session) -> Result<()> {
        if let Some(ref storage_path) = self.storage_path {
            let file_path =
                storage_path.join(format!("{}.json", Self::sanitize_key(&session.key)));
            let content = serde_json::to_string_pretty(session)?;
            tokio::fs::write(&file_path, content).await?;
        }
        Ok(())
    }

    /// Sanitize a session key for use as a filename.
    ///
    /// Uses percent-encoding so the mapping is bijective: different keys
    /// never collide on one filename, and `unsanitize_key` recovers the
    /// original.
    fn sanitize_key(key: &str) -> String {
        let mut result = String::with_capacity(key.len() * 3);
        for c in key.chars() {
            match c {
                '/' => result.push_str("%2F"),
                '\\' => result.push_str("%5C"),
                ':' => result.push_str("%3A"),
                '*' => result.push_str("%2A"),
                '?' => result.push_str("%3F"),
                '"' => result.push_str("%22"),
                '<' => result.push_str("%3C"),
                '>' => result.push_str("%3E"),
                '|' => result.push_str("%7C"),
                '%' => result.push_str("%25"),
                c => result.push(c),
            }
        }
        result
    }

    /// Reverse the sanitization to recover the original key.
    #[allow(dead_code)]
    fn unsanitize_key(sanitized: &str) -> String {
        let mut result = String::with_capacity(sanitized.len());
        let mut chars = sanitized.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '%' {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() == 2 {
                    if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                        result.push(byte as char);
                        continue;
                    }
                }
                result.push('%');
                result.push_str(&hex);
            } else {
                result.push(c);
            }
        }
        result
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
        }
    }
}

impl Default for SessionManager {
    /// Creates an in-memory session manager.
    fn default() -> Self {
        Self::new_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_create_and_retrieve() {
        let manager = SessionManager::new_memory();
        let session = manager.get_or_create("test-session").await.unwrap();
        assert!(session.messages.is_empty());
        assert_eq!(session.key, "test-session");
    }

    #[tokio::test]
    async fn test_append_and_history() {
        let manager = SessionManager::new_memory();
        manager.append("k", Message::user("Hello")).await.unwrap();
        manager.append("k", Message::assistant("Hi!")).await.unwrap();

        let history = manager.history("k").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].content, "Hi!");
    }

    #[tokio::test]
    async fn test_history_of_unseen_key_is_empty() {
        let manager = SessionManager::new_memory();
        let history = manager.history("never-seen").await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().to_path_buf();

        {
            let manager = SessionManager::with_path(storage_path.clone()).unwrap();
            manager
                .append("persist-test", Message::user("Persisted message"))
                .await
                .unwrap();
            manager.persist("persist-test").await.unwrap();
        }

        {
            let manager = SessionManager::with_path(storage_path).unwrap();
            let history = manager.history("persist-test").await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].content, "Persisted message");
        }
    }

    #[tokio::test]
    async fn test_append_is_memory_only_until_persist() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().to_path_buf();

        let manager = SessionManager::with_path(storage_path.clone()).unwrap();
        manager.append("lazy", Message::user("hi")).await.unwrap();
        assert!(!storage_path.join("lazy.json").exists());

        manager.persist("lazy").await.unwrap();
        assert!(storage_path.join("lazy.json").exists());
    }

    #[tokio::test]
    async fn test_session_delete() {
        let manager = SessionManager::new_memory();
        manager.get_or_create("test-session").await.unwrap();
        assert!(manager.exists("test-session").await);

        manager.delete("test-session").await.unwrap();
        assert!(!manager.exists("test-session").await);
    }

    #[tokio::test]
    async fn test_session_list() {
        let manager = SessionManager::new_memory();
        manager.get_or_create("session-a").await.unwrap();
        manager.get_or_create("session-b").await.unwrap();

        let keys = manager.list().await.unwrap();
        assert_eq!(keys, vec!["session-a".to_string(), "session-b".to_string()]);
    }

    #[tokio::test]
    async fn test_session_get_nonexistent() {
        let manager = SessionManager::new_memory();
        let result = manager.get("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_session_manager_clone_shares_state() {
        let manager1 = SessionManager::new_memory();
        let manager2 = manager1.clone();

        manager1.append("shared", Message::user("Test")).await.unwrap();

        let loaded = manager2.get("shared").await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_file_persistence_list_reads_original_keys() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SessionManager::with_path(temp_dir.path().to_path_buf()).unwrap();

        let keys = ["webhook:alice", "cli:direct", "webhook:bob/home"];
        for key in &keys {
            manager.append(key, Message::user("hi")).await.unwrap();
            manager.persist(key).await.unwrap();
        }

        // Clear cache to force reading from disk.
        manager.clear_cache().await;

        let listed_keys = manager.list().await.unwrap();
        assert_eq!(listed_keys.len(), 3);
        for key in &keys {
            assert!(
                listed_keys.contains(&key.to_string()),
                "list() should contain original key '{}', got {:?}",
                key,
                listed_keys
            );
        }
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(SessionManager::sanitize_key("simple"), "simple");
        assert_eq!(
            SessionManager::sanitize_key("webhook:alice"),
            "webhook%3Aalice"
        );
        assert_eq!(
            SessionManager::sanitize_key("path/to/session"),
            "path%2Fto%2Fsession"
        );
        // Percent itself is escaped to make encoding reversible.
        assert_eq!(SessionManager::sanitize_key("100%done"), "100%25done");
    }

    #[test]
    fn test_sanitize_key_round_trip() {
        let keys = [
            "simple",
            "webhook:alice",
            "path/to/session",
            "a:b/c\\d*e?f\"g<h>i|j",
            "100%done",
        ];
        for key in &keys {
            let sanitized = SessionManager::sanitize_key(key);
            assert_eq!(
                SessionManager::unsanitize_key(&sanitized),
                *key,
                "Key '{}' should round-trip through sanitize/unsanitize",
                key
            );
        }
    }

    #[test]
    fn test_sanitize_key_no_collisions() {
        let sanitized1 = SessionManager::sanitize_key("a:b");
        let sanitized2 = SessionManager::sanitize_key("a/b");
        let sanitized3 = SessionManager::sanitize_key("a_b");

        assert_ne!(sanitized1, sanitized2);
        assert_ne!(sanitized1, sanitized3);
        assert_ne!(sanitized2, sanitized3);
    }

    #[tokio::test]
    async fn test_concurrent_appends_on_different_keys() {
        let manager = Arc::new(SessionManager::new_memory());
        let mut handles = Vec::new();

        for i in 0..10 {
            let manager_clone = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                let key = format!("session-{}", i);
                manager_clone
                    .append(&key, Message::user("hello"))
                    .await
                    .unwrap();
                manager_clone.persist(&key).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(manager.list().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_round_trip_all_message_types() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SessionManager::with_path(temp_dir.path().to_path_buf()).unwrap();

        manager
            .append("all-types", Message::user("How far is the wall?"))
            .await
            .unwrap();
        manager
            .append(
                "all-types",
                Message::assistant_with_tools(
                    "Let me measure.",
                    vec![ToolCall::new("call_1", "get_distance", "{}")],
                ),
            )
            .await
            .unwrap();
        manager
            .append("all-types", Message::tool_result("call_1", "12.3 cm"))
            .await
            .unwrap();
        manager
            .append("all-types", Message::assistant("It is 12.3 cm away."))
            .await
            .unwrap();
        manager.persist("all-types").await.unwrap();

        manager.clear_cache().await;

        let history = manager.history("all-types").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert!(history[1].has_tool_calls());
        assert!(history[2].is_tool_result());
        assert_eq!(history[3].content, "It is 12.3 cm away.");
    }
}
