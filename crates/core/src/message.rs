//! Stored message domain types.
//!
//! These are the persisted conversation turns the context engine reads
//! back: a repository returns them, the scorer and strategies rank them,
//! and the assembler renders the survivors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single persisted message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique message ID
    pub id: String,

    /// Conversation this message belongs to
    pub conversation_id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the message was stored
    pub created_at: DateTime<Utc>,

    /// Optional metadata (channel info, provider info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Optional embedding vector (stored as blob in DB)
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl StoredMessage {
    /// Create a message stamped with a fresh ID and the current time.
    pub fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
            embedding: None,
        }
    }

    /// Create a user message.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Assistant, content)
    }

    /// Override the storage timestamp.
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Override the generated ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach a metadata key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn builder_overrides() {
        let ts = Utc::now() - Duration::days(3);
        let msg = StoredMessage::user("conv-1", "hello")
            .with_id("m1")
            .at(ts)
            .with_metadata("channel", serde_json::json!("cli"));
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.created_at, ts);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.metadata["channel"], "cli");
    }

    #[test]
    fn empty_metadata_is_skipped() {
        let msg = StoredMessage::assistant("c", "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("metadata"));
        assert!(!json.contains("embedding"));
    }
}
