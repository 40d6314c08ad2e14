//! Conversation and message types.
//!
//! A [`Conversation`] stores an append-only [`Message`] history. Messages
//! carry stable UUIDs so that clients and the WebSocket protocol can refer
//! to individual messages across reconnects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable message identifier (UUID v4).
    pub message_id: String,

    /// Author of the message.
    pub role: Role,

    /// Message text.
    pub content: String,

    /// When the message was created.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Arbitrary message metadata (e.g. which model produced a reply).
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Message {
    /// Create a new message with a fresh id and timestamp.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: default_metadata(),
        }
    }

    /// Attach metadata to the message, replacing any existing value.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A conversation with its full message history.
///
/// Messages are append-only. Mutations bump `updated_at` so that listings
/// can order by recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable conversation identifier (UUID v4).
    pub conversation_id: String,

    /// Human-readable title.
    pub title: String,

    /// Ordered message history (append-only).
    #[serde(default)]
    pub messages: Vec<Message>,

    /// When the conversation was first created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// When the conversation was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Arbitrary conversation metadata.
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

impl Conversation {
    /// Create a new empty conversation.
    ///
    /// When no title is given, a dated default of the form
    /// `"New Conversation 2025-06-01 14:30"` is used.
    pub fn new(title: Option<String>) -> Self {
        let now = Utc::now();
        let title =
            title.unwrap_or_else(|| format!("New Conversation {}", now.format("%Y-%m-%d %H:%M")));
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            title,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: default_metadata(),
        }
    }

    /// Append a message and bump `updated_at`. Returns a reference to the
    /// stored message.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> &Message {
        self.push_message(Message::new(role, content))
    }

    /// Append an already-constructed message and bump `updated_at`.
    pub fn push_message(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        self.updated_at = Utc::now();
        self.messages.last().unwrap()
    }

    /// The last `max` messages, oldest first.
    pub fn recent_messages(&self, max: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(max);
        &self.messages[start..]
    }

    /// Summary view for listings.
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            conversation_id: self.conversation_id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        }
    }
}

/// Lightweight conversation row for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_has_dated_default_title() {
        let conv = Conversation::new(None);
        assert!(conv.title.starts_with("New Conversation "));
        assert!(conv.messages.is_empty());
    }

    #[test]
    fn explicit_title_is_kept() {
        let conv = Conversation::new(Some("Trip planning".into()));
        assert_eq!(conv.title, "Trip planning");
    }

    #[test]
    fn add_message_appends_and_bumps_updated_at() {
        let mut conv = Conversation::new(None);
        let before = conv.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        conv.add_message(Role::User, "hello");
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at > before);
        assert_eq!(conv.messages[0].role, Role::User);
    }

    #[test]
    fn recent_messages_returns_tail() {
        let mut conv = Conversation::new(None);
        for i in 0..5 {
            conv.add_message(Role::User, format!("msg {i}"));
        }
        let recent = conv.recent_messages(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(recent[1].content, "msg 4");

        // Asking for more than exist returns everything.
        assert_eq!(conv.recent_messages(100).len(), 5);
    }

    #[test]
    fn message_ids_are_unique() {
        let a = Message::new(Role::User, "a");
        let b = Message::new(Role::User, "a");
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn role_round_trips_through_serde() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::Assistant);
    }

    #[test]
    fn role_from_str_rejects_unknown() {
        assert!("moderator".parse::<Role>().is_err());
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
    }

    #[test]
    fn summary_counts_messages() {
        let mut conv = Conversation::new(Some("t".into()));
        conv.add_message(Role::User, "one");
        conv.add_message(Role::Assistant, "two");
        let s = conv.summary();
        assert_eq!(s.message_count, 2);
        assert_eq!(s.title, "t");
    }
}
