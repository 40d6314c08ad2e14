//! Episodic memory types.
//!
//! Long-term facts learned about a user (preferences, biographical facts,
//! notable interactions). Records are stored both in SQLite and in the
//! vector index so they can be recalled by keyword or by similarity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of an episodic memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A stated like or dislike ("I prefer dark mode").
    Preference,
    /// A biographical fact ("my name is Ada").
    Fact,
    /// A notable interaction worth remembering.
    Interaction,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryKind::Preference => write!(f, "preference"),
            MemoryKind::Fact => write!(f, "fact"),
            MemoryKind::Interaction => write!(f, "interaction"),
        }
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preference" => Ok(MemoryKind::Preference),
            "fact" => Ok(MemoryKind::Fact),
            "interaction" => Ok(MemoryKind::Interaction),
            other => Err(format!("unknown memory kind: {other}")),
        }
    }
}

/// A single episodic memory about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable memory identifier (UUID v4).
    pub memory_id: String,

    /// The user this memory is about.
    pub user_id: String,

    /// Category of the memory.
    pub kind: MemoryKind,

    /// The remembered text.
    pub content: String,

    /// When the memory was recorded.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Provenance metadata (source conversation, trigger keyword, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl MemoryRecord {
    /// Create a new memory with a fresh id and timestamp.
    pub fn new(user_id: impl Into<String>, kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            memory_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach provenance metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_and_parse() {
        assert_eq!(MemoryKind::Preference.to_string(), "preference");
        assert_eq!("fact".parse::<MemoryKind>().unwrap(), MemoryKind::Fact);
        assert!("dream".parse::<MemoryKind>().is_err());
    }

    #[test]
    fn kind_serde_is_lowercase() {
        let json = serde_json::to_string(&MemoryKind::Interaction).unwrap();
        assert_eq!(json, "\"interaction\"");
    }

    #[test]
    fn new_record_has_id_and_empty_metadata() {
        let rec = MemoryRecord::new("u1", MemoryKind::Fact, "my name is Ada");
        assert!(!rec.memory_id.is_empty());
        assert_eq!(rec.user_id, "u1");
        assert!(rec.metadata.as_object().unwrap().is_empty());
    }

    #[test]
    fn with_metadata_replaces() {
        let rec = MemoryRecord::new("u1", MemoryKind::Preference, "likes tea")
            .with_metadata(serde_json::json!({"keyword": "like"}));
        assert_eq!(rec.metadata["keyword"], "like");
    }
}
