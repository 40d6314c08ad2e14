//! The engine facade.
//!
//! [`Engine`] owns the router, the SQLite store, the vector index, the
//! retrieval layer, and the performance tracker, and exposes the operations
//! the gateway and CLI call: chat (blocking and streaming), media
//! generation, conversation CRUD, memory, and routing configuration.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use nimbus_llm::types::{AvailableModels, ChatMessage, StreamChunk};
use nimbus_llm::{OllamaProvider, OpenAiProvider, RetryConfig, RetryPolicy};
use nimbus_types::config::{NimbusConfig, RoutingConfig};
use nimbus_types::conversation::{Conversation, ConversationSummary, Message, Role};
use nimbus_types::error::{NimbusError, Result};
use nimbus_types::memory::{MemoryKind, MemoryRecord};

use crate::metrics::PerformanceTracker;
use crate::persistence::Store;
use crate::prompts::build_chat_prompt;
use crate::retrieval::{extract_learnings, ContextRetrieval, RetrievedContext};
use crate::router::ModelRouter;
use crate::vector::{OllamaEmbedder, SearchHit, VectorIndex, KNOWLEDGE_COLLECTION};

/// User id applied when a request carries none.
const DEFAULT_USER: &str = "default";

/// Result of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub message: Message,
    pub model: String,
}

pub struct Engine {
    router: RwLock<ModelRouter>,
    ollama: Arc<OllamaProvider>,
    store: Arc<Store>,
    index: Arc<VectorIndex>,
    retrieval: ContextRetrieval,
    tracker: PerformanceTracker,
    config: NimbusConfig,
}

fn provider_err(e: nimbus_llm::ProviderError) -> NimbusError {
    NimbusError::Provider(e.to_string())
}

impl Engine {
    /// Build the engine from config: open the database, wire the vector
    /// index to Ollama embeddings, and register the configured models with
    /// the router. Models named `gpt*` go to the OpenAI provider (wrapped
    /// in retries), everything else to Ollama.
    pub fn new(config: NimbusConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.db_path())?);
        let ollama = Arc::new(OllamaProvider::new(config.providers.ollama.base_url.clone()));
        let embedder = OllamaEmbedder::new(ollama.clone(), config.memory.embedding_model.clone());
        let index = Arc::new(VectorIndex::new(Arc::new(embedder)));
        let retrieval = ContextRetrieval::new(store.clone(), index.clone());
        let tracker = PerformanceTracker::new(config.metrics_path(), config.tracking.enabled)?;

        let openai = Arc::new(RetryPolicy::new(
            match &config.providers.openai.api_key {
                Some(key) => {
                    OpenAiProvider::with_api_key(config.providers.openai.api_base.clone(), key)
                }
                None => OpenAiProvider::new(config.providers.openai.api_base.clone()),
            },
            RetryConfig::default(),
        ));

        let mut router = ModelRouter::new(config.routing.clone());
        let model_names = std::iter::once(&config.routing.primary_model)
            .chain(config.routing.fallback_models.iter());
        for model in model_names {
            if model.starts_with("gpt") {
                router.register(model.clone(), openai.clone());
            } else {
                router.register(model.clone(), ollama.clone());
            }
        }

        Ok(Self {
            router: RwLock::new(router),
            ollama,
            store,
            index,
            retrieval,
            tracker,
            config,
        })
    }

    pub fn config(&self) -> &NimbusConfig {
        &self.config
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    /// Pull any missing catalog models from the Ollama daemon.
    pub async fn ensure_models(&self) -> Result<()> {
        self.ollama.ensure_models().await.map_err(provider_err)
    }

    fn load_or_create(&self, conversation_id: Option<&str>) -> Result<Conversation> {
        match conversation_id {
            Some(id) => match self.store.load_conversation(id) {
                Ok(conv) => Ok(conv),
                Err(NimbusError::NotFound { .. }) => {
                    debug!(conversation_id = id, "starting new conversation for session");
                    let mut conv = Conversation::new(None);
                    conv.conversation_id = id.to_string();
                    Ok(conv)
                }
                Err(e) => Err(e),
            },
            None => Ok(Conversation::new(None)),
        }
    }

    /// Retrieval context for a turn, empty when memory is disabled.
    async fn turn_context(
        &self,
        conv: &Conversation,
        user_id: Option<&str>,
        message: &str,
    ) -> RetrievedContext {
        if !self.config.memory.enabled {
            return RetrievedContext {
                conversation_history: self.retrieval.conversation_context(conv),
                ..Default::default()
            };
        }
        self.retrieval.combined_context(conv, user_id, message).await
    }

    async fn finish_turn(
        &self,
        conv: &mut Conversation,
        user_id: Option<&str>,
        user_message: Message,
        started: Instant,
    ) -> Result<()> {
        self.store.save_conversation(conv)?;

        let user = user_id.unwrap_or(DEFAULT_USER);
        let learnings = if self.config.memory.enabled {
            extract_learnings(user, &conv.conversation_id, &user_message)
        } else {
            Vec::new()
        };
        if !learnings.is_empty() {
            info!(count = learnings.len(), user_id = user, "learnings extracted");
            self.retrieval.save_learnings(&learnings).await?;
        }

        if let Err(e) = self.tracker.record_completion(
            conv.conversation_id.clone(),
            true,
            started.elapsed().as_secs_f64(),
        ) {
            warn!(error = %e, "failed to record completion metric");
        }
        Ok(())
    }

    /// One blocking chat turn.
    ///
    /// Loads or creates the conversation, assembles context, generates a
    /// reply through the router, persists both messages, and mines the user
    /// message for learnings.
    pub async fn chat(
        &self,
        conversation_id: Option<&str>,
        user_id: Option<&str>,
        message: &str,
    ) -> Result<ChatOutcome> {
        let started = Instant::now();
        let mut conv = self.load_or_create(conversation_id)?;

        let context = self.turn_context(&conv, user_id, message).await;
        let user_message = conv.add_message(Role::User, message).clone();

        let prompt = build_chat_prompt(&context, message);
        let response = self
            .router
            .read()
            .await
            .generate(message, vec![ChatMessage::user(prompt)])
            .await
            .map_err(provider_err)?;

        let mut reply = Message::new(Role::Assistant, response.content.clone());
        reply.metadata = serde_json::json!({"model": response.model});
        let reply = conv.push_message(reply).clone();

        self.finish_turn(&mut conv, user_id, user_message, started)
            .await?;

        Ok(ChatOutcome {
            conversation_id: conv.conversation_id,
            message: reply,
            model: response.model,
        })
    }

    /// Streaming chat turn. Chunks flow through `tx` as they arrive; the
    /// accumulated reply is persisted once the stream ends.
    ///
    /// When `message_id` is given it becomes the id of the stored assistant
    /// message, letting callers announce the id before the stream starts.
    pub async fn chat_stream(
        &self,
        conversation_id: Option<&str>,
        user_id: Option<&str>,
        message: &str,
        message_id: Option<String>,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatOutcome> {
        let started = Instant::now();
        let mut conv = self.load_or_create(conversation_id)?;

        let context = self.turn_context(&conv, user_id, message).await;
        let user_message = conv.add_message(Role::User, message).clone();
        let prompt = build_chat_prompt(&context, message);

        // Forward chunks to the caller while accumulating the full reply.
        let (fwd_tx, mut fwd_rx) = mpsc::channel::<StreamChunk>(32);
        let collector = tokio::spawn(async move {
            let mut content = String::new();
            while let Some(chunk) = fwd_rx.recv().await {
                if let StreamChunk::TextDelta(delta) = &chunk {
                    content.push_str(delta);
                }
                if tx.send(chunk).await.is_err() {
                    // Client went away; keep draining so the reply is saved.
                    while let Some(chunk) = fwd_rx.recv().await {
                        if let StreamChunk::TextDelta(delta) = &chunk {
                            content.push_str(delta);
                        }
                    }
                    break;
                }
            }
            content
        });

        let model = self
            .router
            .read()
            .await
            .generate_stream(message, vec![ChatMessage::user(prompt)], fwd_tx)
            .await
            .map_err(provider_err)?;

        let content = collector
            .await
            .map_err(|e| NimbusError::Provider(format!("stream collector failed: {e}")))?;

        let mut reply = Message::new(Role::Assistant, content);
        if let Some(id) = message_id {
            reply.message_id = id;
        }
        reply.metadata = serde_json::json!({"model": model});
        let reply = conv.push_message(reply).clone();

        self.finish_turn(&mut conv, user_id, user_message, started)
            .await?;

        Ok(ChatOutcome {
            conversation_id: conv.conversation_id,
            message: reply,
            model,
        })
    }

    /// Generate an image, returned as base64.
    pub async fn generate_image(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        self.ollama
            .generate_image(prompt, model)
            .await
            .map_err(provider_err)
    }

    /// Generate a short video, returned as base64.
    pub async fn generate_video(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        self.ollama
            .generate_video(prompt, model)
            .await
            .map_err(provider_err)
    }

    pub fn available_models(&self) -> AvailableModels {
        self.ollama.available_models()
    }

    pub fn create_conversation(&self, title: Option<String>) -> Result<Conversation> {
        let conv = Conversation::new(title);
        self.store.save_conversation(&conv)?;
        Ok(conv)
    }

    pub fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.store.load_conversation(conversation_id)
    }

    pub fn list_conversations(&self, page: usize, page_size: usize) -> Result<Vec<ConversationSummary>> {
        let page = page.max(1);
        self.store
            .list_conversations(page_size, (page - 1) * page_size)
    }

    pub fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        self.store.delete_conversation(conversation_id)
    }

    /// Delete a conversation's history, succeeding even when it never
    /// existed.
    pub fn clear_conversation(&self, conversation_id: &str) -> Result<()> {
        if !self.store.delete_conversation(conversation_id)? {
            debug!(conversation_id, "clear requested for unknown conversation");
        }
        Ok(())
    }

    /// Index a knowledge document. Returns its id.
    pub async fn add_knowledge(
        &self,
        text: &str,
        metadata: serde_json::Value,
        id: Option<String>,
    ) -> Result<String> {
        self.index.add(KNOWLEDGE_COLLECTION, id, text, metadata).await
    }

    pub async fn search_knowledge(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.index.search(KNOWLEDGE_COLLECTION, query, limit, None).await
    }

    /// Store an episodic memory for a user, in SQLite and the index.
    pub async fn add_episodic(
        &self,
        user_id: &str,
        kind: MemoryKind,
        content: &str,
    ) -> Result<MemoryRecord> {
        let record = MemoryRecord::new(user_id, kind, content);
        self.retrieval.save_learnings(std::slice::from_ref(&record)).await?;
        Ok(record)
    }

    pub async fn search_episodic(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Vec<SearchHit> {
        self.retrieval.search_episodic(user_id, query, limit).await
    }

    pub async fn routing_config(&self) -> RoutingConfig {
        self.router.read().await.config().clone()
    }

    pub async fn update_routing(&self, config: RoutingConfig) {
        info!(primary = %config.primary_model, "routing config updated");
        self.router.write().await.set_config(config);
    }
}
