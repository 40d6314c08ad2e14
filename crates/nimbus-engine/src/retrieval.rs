//! Context retrieval and episodic learning.
//!
//! Builds the three context blocks that feed the chat prompt (recent
//! conversation turns, relevant knowledge, known user facts) and mines
//! finished exchanges for preferences and facts worth remembering.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use nimbus_types::conversation::{Conversation, Message, Role};
use nimbus_types::error::Result;
use nimbus_types::memory::{MemoryKind, MemoryRecord};

use crate::persistence::Store;
use crate::vector::{SearchHit, VectorIndex, EPISODIC_COLLECTION, KNOWLEDGE_COLLECTION};

/// How many recent turns go into the prompt.
const HISTORY_TURNS: usize = 10;
/// How many knowledge and episodic hits to retrieve.
const RETRIEVAL_TOP_K: usize = 3;

const PREFERENCE_KEYWORDS: &[&str] = &["prefer", "like", "favorite", "hate", "dislike"];
const FACT_PHRASES: &[&str] = &["my name is", "i am", "i'm", "i live", "my job", "my email"];

/// The assembled context for one chat turn.
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub conversation_history: String,
    pub knowledge_context: String,
    pub user_context: String,
}

/// Pulls prompt context from the conversation, the knowledge collection,
/// and the user's episodic memory.
pub struct ContextRetrieval {
    store: Arc<Store>,
    index: Arc<VectorIndex>,
}

impl ContextRetrieval {
    pub fn new(store: Arc<Store>, index: Arc<VectorIndex>) -> Self {
        Self { store, index }
    }

    /// Render the last [`HISTORY_TURNS`] messages as "Role: content" lines
    /// separated by blank lines.
    pub fn conversation_context(&self, conversation: &Conversation) -> String {
        conversation
            .recent_messages(HISTORY_TURNS)
            .iter()
            .map(|m| format!("{}: {}", capitalize(&m.role.to_string()), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Search the knowledge collection and render hits as a numbered
    /// "Relevant Knowledge:" block. Empty string when nothing matches.
    pub async fn knowledge_context(&self, query: &str) -> String {
        let hits = match self
            .index
            .search(KNOWLEDGE_COLLECTION, query, RETRIEVAL_TOP_K, None)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "knowledge search failed, continuing without");
                return String::new();
            }
        };
        if hits.is_empty() {
            return String::new();
        }

        let mut block = String::from("Relevant Knowledge:");
        for (i, hit) in hits.iter().enumerate() {
            block.push_str(&format!("\n{}. {}", i + 1, hit.text));
        }
        block
    }

    /// Search the user's episodic memory and render hits as a
    /// "User Information:" block with "Kind: content" lines. Falls back to
    /// SQL keyword search when the vector index has nothing for the user.
    pub async fn episodic_context(&self, user_id: &str, query: &str) -> String {
        let hits = self.search_episodic(user_id, query, RETRIEVAL_TOP_K).await;
        if hits.is_empty() {
            return String::new();
        }

        let mut block = String::from("User Information:");
        for hit in &hits {
            let kind = hit
                .metadata
                .get("kind")
                .and_then(|v| v.as_str())
                .unwrap_or("interaction");
            block.push_str(&format!("\n{}: {}", capitalize(kind), hit.text));
        }
        block
    }

    /// Vector search over the user's episodic memories, with a SQL keyword
    /// fallback (score 1.0) when the index yields nothing.
    pub async fn search_episodic(&self, user_id: &str, query: &str, limit: usize) -> Vec<SearchHit> {
        let filter = json!({"user_id": user_id});
        match self
            .index
            .search(EPISODIC_COLLECTION, query, limit, Some(&filter))
            .await
        {
            Ok(hits) if !hits.is_empty() => return hits,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "episodic vector search failed, trying keyword search"),
        }

        match self.store.search_memories_like(user_id, None, query, limit) {
            Ok(records) => records
                .into_iter()
                .map(|r| SearchHit {
                    id: r.memory_id,
                    text: r.content,
                    metadata: json!({"user_id": r.user_id, "kind": r.kind.to_string()}),
                    score: 1.0,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "episodic keyword search failed");
                Vec::new()
            }
        }
    }

    /// Assemble all three blocks for one chat turn.
    pub async fn combined_context(
        &self,
        conversation: &Conversation,
        user_id: Option<&str>,
        query: &str,
    ) -> RetrievedContext {
        let user_context = match user_id {
            Some(uid) => self.episodic_context(uid, query).await,
            None => String::new(),
        };
        RetrievedContext {
            conversation_history: self.conversation_context(conversation),
            knowledge_context: self.knowledge_context(query).await,
            user_context,
        }
    }

    /// Persist extracted learnings to SQLite and the episodic collection.
    pub async fn save_learnings(&self, learnings: &[MemoryRecord]) -> Result<()> {
        for record in learnings {
            self.store.insert_memory(record)?;
            let mut metadata = record.metadata.clone();
            if let Some(map) = metadata.as_object_mut() {
                map.insert("user_id".into(), json!(record.user_id));
                map.insert("kind".into(), json!(record.kind.to_string()));
            }
            if let Err(e) = self
                .index
                .add(
                    EPISODIC_COLLECTION,
                    Some(record.memory_id.clone()),
                    &record.content,
                    metadata,
                )
                .await
            {
                warn!(error = %e, memory_id = %record.memory_id, "failed to index learning");
            }
        }
        debug!(count = learnings.len(), "learnings saved");
        Ok(())
    }
}

/// Mine a user message for preferences and personal facts.
///
/// A sentence mentioning a preference keyword becomes a preference record;
/// one matching a fact phrase becomes a fact record. The same sentence can
/// yield at most one record, preference winning.
pub fn extract_learnings(
    user_id: &str,
    conversation_id: &str,
    message: &Message,
) -> Vec<MemoryRecord> {
    if message.role != Role::User {
        return Vec::new();
    }

    let mut learnings = Vec::new();
    for sentence in split_sentences(&message.content) {
        let lower = sentence.to_lowercase();

        let matched = PREFERENCE_KEYWORDS
            .iter()
            .find(|kw| lower.contains(*kw))
            .map(|kw| (MemoryKind::Preference, *kw))
            .or_else(|| {
                FACT_PHRASES
                    .iter()
                    .find(|ph| lower.contains(*ph))
                    .map(|ph| (MemoryKind::Fact, *ph))
            });

        if let Some((kind, keyword)) = matched {
            learnings.push(
                MemoryRecord::new(user_id, kind, sentence).with_metadata(json!({
                    "source": "conversation",
                    "conversation_id": conversation_id,
                    "message_id": message.message_id,
                    "keyword": keyword,
                })),
            );
        }
    }
    learnings
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Embedder;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // Crude bag-of-letters embedding, enough for overlap ranking.
            let mut v = vec![0.0f32; 26];
            for c in text.to_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                v[(c - b'a') as usize] += 1.0;
            }
            Ok(v)
        }
    }

    fn retrieval() -> ContextRetrieval {
        let store = Arc::new(Store::in_memory().unwrap());
        let index = Arc::new(VectorIndex::new(Arc::new(FakeEmbedder)));
        ContextRetrieval::new(store, index)
    }

    #[test]
    fn conversation_context_renders_role_lines() {
        let r = retrieval();
        let mut conv = Conversation::new(None);
        conv.add_message(Role::User, "hi there");
        conv.add_message(Role::Assistant, "hello");

        let ctx = r.conversation_context(&conv);
        assert_eq!(ctx, "User: hi there\n\nAssistant: hello");
    }

    #[test]
    fn conversation_context_keeps_last_ten() {
        let r = retrieval();
        let mut conv = Conversation::new(None);
        for i in 0..15 {
            conv.add_message(Role::User, format!("message {i}"));
        }
        let ctx = r.conversation_context(&conv);
        assert!(!ctx.contains("message 4"));
        assert!(ctx.contains("message 5"));
        assert!(ctx.contains("message 14"));
    }

    #[tokio::test]
    async fn knowledge_context_is_numbered() {
        let r = retrieval();
        r.index
            .add(KNOWLEDGE_COLLECTION, None, "rust is fast", json!({}))
            .await
            .unwrap();
        r.index
            .add(KNOWLEDGE_COLLECTION, None, "python is slow", json!({}))
            .await
            .unwrap();

        let block = r.knowledge_context("rust speed").await;
        assert!(block.starts_with("Relevant Knowledge:\n1. "));
        assert!(block.contains("\n2. "));
    }

    #[tokio::test]
    async fn knowledge_context_empty_when_no_documents() {
        let r = retrieval();
        assert_eq!(r.knowledge_context("anything").await, "");
    }

    #[tokio::test]
    async fn episodic_context_falls_back_to_keyword_search() {
        let r = retrieval();
        // Only in SQLite, not in the vector index.
        r.store
            .insert_memory(&MemoryRecord::new("u1", MemoryKind::Fact, "my name is Ada"))
            .unwrap();

        let block = r.episodic_context("u1", "name").await;
        assert_eq!(block, "User Information:\nFact: my name is Ada");
    }

    #[tokio::test]
    async fn episodic_context_scopes_to_user() {
        let r = retrieval();
        let learnings = vec![MemoryRecord::new("u2", MemoryKind::Fact, "my name is Grace")];
        r.save_learnings(&learnings).await.unwrap();

        assert_eq!(r.episodic_context("u1", "name").await, "");
        assert!(r.episodic_context("u2", "name").await.contains("Grace"));
    }

    #[test]
    fn extracts_preferences_and_facts() {
        let msg = Message::new(Role::User, "I prefer dark roast. My name is Ada. The sky is blue.");
        let learnings = extract_learnings("u1", "c1", &msg);
        assert_eq!(learnings.len(), 2);
        assert_eq!(learnings[0].kind, MemoryKind::Preference);
        assert_eq!(learnings[0].content, "I prefer dark roast");
        assert_eq!(learnings[1].kind, MemoryKind::Fact);
        assert_eq!(learnings[1].metadata["keyword"], "my name is");
        assert_eq!(learnings[1].metadata["conversation_id"], "c1");
    }

    #[test]
    fn preference_wins_over_fact_in_same_sentence() {
        let msg = Message::new(Role::User, "I am someone who really likes tea");
        let learnings = extract_learnings("u1", "c1", &msg);
        assert_eq!(learnings.len(), 1);
        assert_eq!(learnings[0].kind, MemoryKind::Preference);
    }

    #[test]
    fn assistant_messages_yield_nothing() {
        let msg = Message::new(Role::Assistant, "I prefer to answer concisely");
        assert!(extract_learnings("u1", "c1", &msg).is_empty());
    }

    #[tokio::test]
    async fn save_learnings_persists_and_indexes() {
        let r = retrieval();
        let msg = Message::new(Role::User, "I live in Lisbon");
        let learnings = extract_learnings("u1", "c1", &msg);
        assert_eq!(learnings.len(), 1);
        r.save_learnings(&learnings).await.unwrap();

        let stored = r.store.search_memories_like("u1", None, "Lisbon", 5).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(r.index.len(EPISODIC_COLLECTION), 1);
    }
}
