//! Chat data models
//!
//! Defines the message structures exchanged between client, gateway, and
//! inference backend.

use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions, including the retrieved-context block
    System,
    /// Message from the user
    User,
    /// Message from the assistant/model
    Assistant,
    /// Tool output fed back into the conversation
    Tool,
}

impl ChatRole {
    /// Convert the role to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        }
    }
}

/// A single message in a conversation
///
/// Immutable once appended; ordering within a conversation is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: ChatRole,
    /// Content of the message
    pub content: String,
    /// Optional base64-encoded image attachments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Optional structured tool calls emitted by the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
}

impl ChatMessage {
    /// Create a plain text message
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
            tool_calls: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization_is_lowercase() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
        // Optional fields stay off the wire when unset
        assert!(json.get("images").is_none());
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_role_deserialization() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"tool","content":"output"}"#).unwrap();
        assert_eq!(msg.role, ChatRole::Tool);
    }
}
