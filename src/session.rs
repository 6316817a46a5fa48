//! Session state management
//!
//! Keeps per-session conversation context server-side: created on first use,
//! appended to after each completed exchange, trimmed to a configured size,
//! and cleared on request. Sessions are independent; cross-session ordering
//! does not exist.

use crate::message::ChatMessage;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Conversation context owned by one client session
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Ordered, append-only message history
    pub messages: Vec<ChatMessage>,
    /// Model used by the most recent request
    pub model: Option<String>,
    /// Retrieval index used by the most recent request
    pub index: Option<String>,
    /// Whether the most recent request streamed
    pub streaming: bool,
    /// When the session was first seen
    pub created_at: DateTime<Utc>,
}

impl ConversationState {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            model: None,
            index: None,
            streaming: true,
            created_at: Utc::now(),
        }
    }
}

/// In-memory store of per-session conversation state
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed exchange for a session, creating it if needed
    ///
    /// Appends the user query and the assistant reply, updates the active
    /// model/index/streaming fields, and trims the history to `max_size`
    /// messages (oldest dropped first).
    pub async fn record_exchange(
        &self,
        session_id: &str,
        user: ChatMessage,
        assistant: ChatMessage,
        model: &str,
        index: Option<&str>,
        streaming: bool,
        max_size: usize,
    ) {
        let mut sessions = self.sessions.write().await;
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(ConversationState::new);

        state.messages.push(user);
        state.messages.push(assistant);
        state.model = Some(model.to_string());
        state.index = index.map(str::to_string);
        state.streaming = streaming;

        if state.messages.len() > max_size {
            let excess = state.messages.len() - max_size;
            state.messages.drain(..excess);
            debug!(
                session_id = %session_id,
                trimmed = excess,
                "Trimmed session context"
            );
        }
    }

    /// The session's message history, empty when the session is unknown
    pub async fn context(&self, session_id: &str) -> Vec<ChatMessage> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Clear a session's context, returning how many messages were dropped
    pub async fn clear(&self, session_id: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(state) => {
                let cleared = state.messages.len();
                state.messages.clear();
                info!(session_id = %session_id, cleared, "Cleared session context");
                cleared
            }
            None => 0,
        }
    }

    /// Number of known sessions, for tests and logging
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatMessage;

    #[tokio::test]
    async fn test_record_exchange_creates_session() {
        let store = SessionStore::new();
        store
            .record_exchange(
                "s1",
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                "m",
                Some("default"),
                true,
                20,
            )
            .await;

        let context = store.context("s1").await;
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].content, "hi");
        assert_eq!(context[1].content, "hello");
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_context_trimmed_to_max_size() {
        let store = SessionStore::new();
        for i in 0..5 {
            store
                .record_exchange(
                    "s1",
                    ChatMessage::user(format!("q{}", i)),
                    ChatMessage::assistant(format!("a{}", i)),
                    "m",
                    None,
                    true,
                    4,
                )
                .await;
        }

        let context = store.context("s1").await;
        assert_eq!(context.len(), 4);
        // Oldest messages dropped first
        assert_eq!(context[0].content, "q3");
        assert_eq!(context[3].content, "a4");
    }

    #[tokio::test]
    async fn test_clear_empties_context() {
        let store = SessionStore::new();
        store
            .record_exchange(
                "s1",
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                "m",
                None,
                true,
                20,
            )
            .await;

        assert_eq!(store.clear("s1").await, 2);
        assert!(store.context("s1").await.is_empty());
        // Clearing an unknown session is a no-op
        assert_eq!(store.clear("unknown").await, 0);
    }
}
