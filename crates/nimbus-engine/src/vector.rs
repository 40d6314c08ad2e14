//! In-process vector memory.
//!
//! Named collections of embedded documents with brute-force cosine
//! similarity search. Embeddings come from an [`Embedder`], normally the
//! Ollama embeddings endpoint; tests plug in a deterministic fake.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use nimbus_llm::ollama::OllamaProvider;
use nimbus_types::error::{NimbusError, Result};

/// Collection holding long-lived knowledge documents.
pub const KNOWLEDGE_COLLECTION: &str = "knowledge";
/// Collection holding per-user episodic learnings.
pub const EPISODIC_COLLECTION: &str = "episodic";

/// Produces an embedding vector for a piece of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// [`Embedder`] backed by the Ollama `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    provider: Arc<OllamaProvider>,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(provider: Arc<OllamaProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.provider
            .embeddings(&self.model, text)
            .await
            .map_err(|e| NimbusError::Memory(e.to_string()))
    }
}

/// A single search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

struct Document {
    id: String,
    text: String,
    metadata: serde_json::Value,
    embedding: Vec<f32>,
}

/// Brute-force cosine-similarity index over named collections.
///
/// Fine at assistant scale (thousands of documents); swap in an ANN index
/// if collections ever grow past that.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Embed `text` and add it to `collection`. Returns the document id,
    /// generated when `id` is `None`.
    pub async fn add(
        &self,
        collection: &str,
        id: Option<String>,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let embedding = self.embedder.embed(text).await?;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut collections = self.collections.write().map_err(|_| lock_poisoned())?;
        let docs = collections.entry(collection.to_string()).or_default();
        docs.retain(|d| d.id != id);
        docs.push(Document {
            id: id.clone(),
            text: text.to_string(),
            metadata,
            embedding,
        });
        debug!(collection, id = %id, "document indexed");
        Ok(id)
    }

    /// Search `collection` for the `top_k` documents most similar to
    /// `query`. When `filter` is given, only documents whose metadata
    /// contains every filter key with an equal value are considered.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        filter: Option<&serde_json::Value>,
    ) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed(query).await?;

        let collections = self.collections.read().map_err(|_| lock_poisoned())?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter(|doc| filter.is_none_or(|f| metadata_matches(&doc.metadata, f)))
            .map(|doc| SearchHit {
                id: doc.id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                score: cosine_similarity(&query_embedding, &doc.embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Fetch a document by id.
    pub fn get(&self, collection: &str, id: &str) -> Option<SearchHit> {
        let collections = self.collections.read().ok()?;
        collections.get(collection)?.iter().find(|d| d.id == id).map(|d| SearchHit {
            id: d.id.clone(),
            text: d.text.clone(),
            metadata: d.metadata.clone(),
            score: 1.0,
        })
    }

    /// Remove a document. Returns true if it existed.
    pub fn delete(&self, collection: &str, id: &str) -> bool {
        let Ok(mut collections) = self.collections.write() else {
            return false;
        };
        match collections.get_mut(collection) {
            Some(docs) => {
                let before = docs.len();
                docs.retain(|d| d.id != id);
                docs.len() < before
            }
            None => false,
        }
    }

    pub fn create_collection(&self, collection: &str) {
        if let Ok(mut collections) = self.collections.write() {
            collections.entry(collection.to_string()).or_default();
        }
    }

    /// Drop a collection and everything in it.
    pub fn drop_collection(&self, collection: &str) -> bool {
        self.collections
            .write()
            .map(|mut c| c.remove(collection).is_some())
            .unwrap_or(false)
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.collections
            .read()
            .map(|c| {
                let mut names: Vec<String> = c.keys().cloned().collect();
                names.sort();
                names
            })
            .unwrap_or_default()
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

fn lock_poisoned() -> NimbusError {
    NimbusError::Memory("vector index lock poisoned".into())
}

/// Every key in `filter` must be present in `metadata` with an equal value.
fn metadata_matches(metadata: &serde_json::Value, filter: &serde_json::Value) -> bool {
    match filter.as_object() {
        Some(map) => map.iter().all(|(k, v)| metadata.get(k) == Some(v)),
        None => true,
    }
}

/// Cosine similarity of two vectors. Returns 0.0 for mismatched lengths
/// or zero-norm inputs.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
