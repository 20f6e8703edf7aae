//! The stored shape of a conversation.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::openai::{Message, Role};

/// Side-channel fields carried next to the message content. The
/// model never sees these. Unknown keys are kept so that rewriting a
/// session doesn't lose anything written by another version.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            metadata: MessageMetadata::default(),
        }
    }

    /// A message with a fresh identifier and timestamp.
    pub fn with_id(role: Role, content: &str, id: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            metadata: MessageMetadata {
                id: Some(id.to_string()),
                created_at: Some(Utc::now()),
                extra: Map::new(),
            },
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.metadata.id.as_deref()
    }

    /// True when both messages say the same thing, ignoring
    /// surrounding whitespace and metadata.
    pub fn same_content(&self, other: &ChatMessage) -> bool {
        self.role == other.role && self.content.trim() == other.content.trim()
    }
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        Message::new(msg.role, &msg.content)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionMeta {
    pub id: String,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionMeta {
    pub fn new(id: &str, user_id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            user_id: user_id.map(String::from),
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sessions without an owner are visible to everyone.
    pub fn is_visible_to(&self, user_id: Option<&str>) -> bool {
        match (&self.user_id, user_id) {
            (None, _) => true,
            (Some(owner), Some(user)) => owner == user,
            (Some(_), None) => false,
        }
    }
}
