//! SQLite persistence for conversations and episodic memory.
//!
//! One database file holds three tables: `conversations`, `messages`, and
//! `episodic_memory`. Saving a conversation upserts its row and replaces
//! its messages; loads rebuild the message list ordered by timestamp.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use nimbus_types::conversation::{Conversation, ConversationSummary, Message, Role};
use nimbus_types::error::{NimbusError, Result};
use nimbus_types::memory::{MemoryKind, MemoryRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    conversation_id TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    metadata        TEXT NOT NULL DEFAULT '{}',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    message_id      TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
    role            TEXT NOT NULL,
    content         TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    metadata        TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(conversation_id, timestamp);
CREATE TABLE IF NOT EXISTS episodic_memory (
    memory_id TEXT PRIMARY KEY,
    user_id   TEXT NOT NULL,
    kind      TEXT NOT NULL,
    content   TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    metadata  TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_episodic_user ON episodic_memory(user_id, kind);
";

fn db_err(e: rusqlite::Error) -> NimbusError {
    NimbusError::Persistence(e.to_string())
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_metadata(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

/// SQLite-backed store for conversations and episodic memory.
///
/// The connection is serialized behind a mutex; every operation is a short
/// transaction so holding it across await points never happens.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and run the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!(path = %path.display(), "database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Upsert the conversation row and replace its messages.
    pub fn save_conversation(&self, conv: &Conversation) -> Result<()> {
        let mut guard = self.conn.lock().map_err(|_| poisoned())?;
        let tx = guard.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO conversations
                 (conversation_id, title, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conv.conversation_id,
                conv.title,
                conv.metadata.to_string(),
                conv.created_at.to_rfc3339(),
                conv.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conv.conversation_id],
        )
        .map_err(db_err)?;

        for msg in &conv.messages {
            tx.execute(
                "INSERT INTO messages
                     (message_id, conversation_id, role, content, timestamp, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.message_id,
                    conv.conversation_id,
                    msg.role.to_string(),
                    msg.content,
                    msg.timestamp.to_rfc3339(),
                    msg.metadata.to_string(),
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }

    /// Load a conversation with its messages ordered by timestamp.
    pub fn load_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let guard = self.conn.lock().map_err(|_| poisoned())?;

        let mut conv = guard
            .query_row(
                "SELECT title, metadata, created_at, updated_at
                 FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                |row| {
                    let title: String = row.get(0)?;
                    let metadata: String = row.get(1)?;
                    let created_at: String = row.get(2)?;
                    let updated_at: String = row.get(3)?;
                    Ok(Conversation {
                        conversation_id: conversation_id.to_string(),
                        title,
                        messages: Vec::new(),
                        created_at: parse_timestamp(&created_at),
                        updated_at: parse_timestamp(&updated_at),
                        metadata: parse_metadata(&metadata),
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => NimbusError::NotFound {
                    resource: format!("conversation {conversation_id}"),
                },
                other => db_err(other),
            })?;

        let mut stmt = guard
            .prepare(
                "SELECT message_id, role, content, timestamp, metadata
                 FROM messages WHERE conversation_id = ?1 ORDER BY timestamp",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![conversation_id], |row| {
                let message_id: String = row.get(0)?;
                let role: String = row.get(1)?;
                let content: String = row.get(2)?;
                let timestamp: String = row.get(3)?;
                let metadata: String = row.get(4)?;
                Ok((message_id, role, content, timestamp, metadata))
            })
            .map_err(db_err)?;

        for row in rows {
            let (message_id, role, content, timestamp, metadata) = row.map_err(db_err)?;
            conv.messages.push(Message {
                message_id,
                role: role.parse::<Role>().unwrap_or(Role::User),
                content,
                timestamp: parse_timestamp(&timestamp),
                metadata: parse_metadata(&metadata),
            });
        }

        Ok(conv)
    }

    /// Delete a conversation and its messages. Returns true if it existed.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let mut guard = self.conn.lock().map_err(|_| poisoned())?;
        let tx = guard.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )
        .map_err(db_err)?;
        let deleted = tx
            .execute(
                "DELETE FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(deleted > 0)
    }

    /// List conversations newest-updated first, with message counts.
    pub fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<ConversationSummary>> {
        let guard = self.conn.lock().map_err(|_| poisoned())?;
        let mut stmt = guard
            .prepare(
                "SELECT c.conversation_id, c.title, c.created_at, c.updated_at,
                        COUNT(m.message_id) AS message_count
                 FROM conversations c
                 LEFT JOIN messages m ON m.conversation_id = c.conversation_id
                 GROUP BY c.conversation_id
                 ORDER BY c.updated_at DESC
                 LIMIT ?1 OFFSET ?2",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                let conversation_id: String = row.get(0)?;
                let title: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                let updated_at: String = row.get(3)?;
                let message_count: i64 = row.get(4)?;
                Ok(ConversationSummary {
                    conversation_id,
                    title,
                    created_at: parse_timestamp(&created_at),
                    updated_at: parse_timestamp(&updated_at),
                    message_count: message_count as usize,
                })
            })
            .map_err(db_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Insert an episodic memory row.
    pub fn insert_memory(&self, record: &MemoryRecord) -> Result<()> {
        let guard = self.conn.lock().map_err(|_| poisoned())?;
        guard
            .execute(
                "INSERT OR REPLACE INTO episodic_memory
                     (memory_id, user_id, kind, content, timestamp, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.memory_id,
                    record.user_id,
                    record.kind.to_string(),
                    record.content,
                    record.timestamp.to_rfc3339(),
                    record.metadata.to_string(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Keyword search over episodic memory (`LIKE`), newest first.
    ///
    /// This is the fallback path when vector search is unavailable or
    /// returns nothing.
    pub fn search_memories_like(
        &self,
        user_id: &str,
        kind: Option<MemoryKind>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let guard = self.conn.lock().map_err(|_| poisoned())?;
        let pattern = format!("%{query}%");
        let kind_pattern = match kind {
            Some(k) => k.to_string(),
            None => "%".to_string(),
        };

        let mut stmt = guard
            .prepare(
                "SELECT memory_id, user_id, kind, content, timestamp, metadata
                 FROM episodic_memory
                 WHERE user_id = ?1 AND kind LIKE ?2 AND content LIKE ?3
                 ORDER BY timestamp DESC
                 LIMIT ?4",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(
                params![user_id, kind_pattern, pattern, limit as i64],
                |row| {
                    let memory_id: String = row.get(0)?;
                    let user_id: String = row.get(1)?;
                    let kind: String = row.get(2)?;
                    let content: String = row.get(3)?;
                    let timestamp: String = row.get(4)?;
                    let metadata: String = row.get(5)?;
                    Ok((memory_id, user_id, kind, content, timestamp, metadata))
                },
            )
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (memory_id, user_id, kind, content, timestamp, metadata) = row.map_err(db_err)?;
            records.push(MemoryRecord {
                memory_id,
                user_id,
                kind: kind.parse().unwrap_or(MemoryKind::Interaction),
                content,
                timestamp: parse_timestamp(&timestamp),
                metadata: parse_metadata(&metadata),
            });
        }
        Ok(records)
    }
}

fn poisoned() -> NimbusError {
    NimbusError::Persistence("database lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_conversation() -> Conversation {
        let mut conv = Conversation::new(Some("Trip planning".into()));
        conv.add_message(Role::User, "Where should I go in May?");
        conv.add_message(Role::Assistant, "Portugal is lovely in May.");
        conv
    }

    #[test]
    fn save_and_load_roundtrip() {
        let store = Store::in_memory().unwrap();
        let conv = sample_conversation();
        store.save_conversation(&conv).unwrap();

        let loaded = store.load_conversation(&conv.conversation_id).unwrap();
        assert_eq!(loaded.title, "Trip planning");
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].role, Role::User);
        assert_eq!(loaded.messages[1].content, "Portugal is lovely in May.");
    }

    #[test]
    fn save_replaces_messages() {
        let store = Store::in_memory().unwrap();
        let mut conv = sample_conversation();
        store.save_conversation(&conv).unwrap();

        conv.add_message(Role::User, "What about June?");
        store.save_conversation(&conv).unwrap();

        let loaded = store.load_conversation(&conv.conversation_id).unwrap();
        assert_eq!(loaded.messages.len(), 3);
    }

    #[test]
    fn load_missing_is_not_found() {
        let store = Store::in_memory().unwrap();
        let err = store.load_conversation("nope").unwrap_err();
        assert!(matches!(err, NimbusError::NotFound { .. }));
    }

    #[test]
    fn delete_removes_conversation_and_messages() {
        let store = Store::in_memory().unwrap();
        let conv = sample_conversation();
        store.save_conversation(&conv).unwrap();

        assert!(store.delete_conversation(&conv.conversation_id).unwrap());
        assert!(!store.delete_conversation(&conv.conversation_id).unwrap());
        assert!(store.load_conversation(&conv.conversation_id).is_err());
    }

    #[test]
    fn list_orders_by_updated_at_desc() {
        let store = Store::in_memory().unwrap();
        let mut first = Conversation::new(Some("first".into()));
        first.updated_at = Utc::now() - chrono::Duration::hours(1);
        let second = Conversation::new(Some("second".into()));
        store.save_conversation(&first).unwrap();
        store.save_conversation(&second).unwrap();

        let list = store.list_conversations(10, 0).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title, "second");
        assert_eq!(list[1].title, "first");
    }

    #[test]
    fn list_reports_message_counts_and_paginates() {
        let store = Store::in_memory().unwrap();
        for i in 0..3 {
            let mut conv = Conversation::new(Some(format!("c{i}")));
            conv.add_message(Role::User, "hi");
            store.save_conversation(&conv).unwrap();
        }

        let page = store.list_conversations(2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].message_count, 1);

        let rest = store.list_conversations(2, 2).unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn memory_insert_and_like_search() {
        let store = Store::in_memory().unwrap();
        store
            .insert_memory(&MemoryRecord::new("u1", MemoryKind::Preference, "I prefer tea"))
            .unwrap();
        store
            .insert_memory(&MemoryRecord::new("u1", MemoryKind::Fact, "my name is Ada"))
            .unwrap();
        store
            .insert_memory(&MemoryRecord::new("u2", MemoryKind::Fact, "my name is Grace"))
            .unwrap();

        let hits = store
            .search_memories_like("u1", None, "name", 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "my name is Ada");

        // Kind filter.
        let prefs = store
            .search_memories_like("u1", Some(MemoryKind::Preference), "tea", 10)
            .unwrap();
        assert_eq!(prefs.len(), 1);

        let none = store
            .search_memories_like("u1", Some(MemoryKind::Preference), "name", 10)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("nimbus.db");
        let store = Store::open(&path).unwrap();
        store.save_conversation(&sample_conversation()).unwrap();
        assert!(path.exists());
    }
}
