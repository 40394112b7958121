use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The role of the participant that authored an [`Entry`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
}

/// A single entry persisted in a conversation's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier for this entry.
    pub id: Uuid,
    /// The conversation this entry belongs to.
    pub conversation_id: Uuid,
    /// The role of the entry author.
    pub role: Role,
    /// The textual content of the entry.
    pub content: String,
    /// UTC timestamp of when the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary key-value metadata attached to the entry.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Entry {
    /// Creates a new entry with the given role, content, and conversation ID.
    pub fn new(role: Role, content: impl Into<String>, conversation_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Creates a new entry with [`Role::User`].
    pub fn user(content: impl Into<String>, conversation_id: Uuid) -> Self {
        Self::new(Role::User, content, conversation_id)
    }

    /// Creates a new entry with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>, conversation_id: Uuid) -> Self {
        Self::new(Role::Assistant, content, conversation_id)
    }

    /// Attaches a metadata value, returning the entry for chaining.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
