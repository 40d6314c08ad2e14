//! Complexity-aware model routing with ordered fallback.
//!
//! [`ModelRouter`] owns the mapping from model names to the providers that
//! serve them, plus the routing thresholds. Simple or oversized queries are
//! steered away from the primary model; when a model fails with a transient
//! error the router walks the fallback list, and streaming callers get a
//! visible notice when output switches models mid-conversation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nimbus_llm::error::ProviderError;
use nimbus_llm::types::{ChatMessage, ChatRequest, ChatResponse, StreamChunk};
use nimbus_llm::Provider;
use nimbus_types::config::RoutingConfig;

use crate::complexity::score_complexity;

/// A model name bound to the provider that serves it.
struct ModelBackend {
    model: String,
    provider: Arc<dyn Provider>,
}

/// Routes queries across a primary model and ordered fallbacks.
pub struct ModelRouter {
    backends: Vec<ModelBackend>,
    config: RoutingConfig,
}

/// Whether an error justifies moving on to the next model.
///
/// Transient errors qualify, as do permanent errors that are specific to
/// one backend (missing key, unknown model). Auth failures and parse
/// errors are returned to the caller immediately.
fn is_failover_eligible(err: &ProviderError) -> bool {
    err.is_retryable()
        || matches!(
            err,
            ProviderError::NotConfigured(_) | ProviderError::ModelNotFound { .. }
        )
}

impl ModelRouter {
    /// Create a router with the given thresholds and an empty model table.
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            backends: Vec::new(),
            config,
        }
    }

    /// Bind `model` to `provider`. Registration order does not matter; the
    /// attempt order comes from the routing config.
    pub fn register(&mut self, model: impl Into<String>, provider: Arc<dyn Provider>) {
        self.backends.push(ModelBackend {
            model: model.into(),
            provider,
        });
    }

    /// The routing configuration.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Replace the routing thresholds and model order.
    pub fn set_config(&mut self, config: RoutingConfig) {
        self.config = config;
    }

    fn backend(&self, model: &str) -> Option<&ModelBackend> {
        self.backends.iter().find(|b| b.model == model)
    }

    /// The primary followed by the fallbacks, skipping unregistered names.
    fn candidates(&self) -> Vec<&ModelBackend> {
        std::iter::once(self.config.primary_model.as_str())
            .chain(self.config.fallback_models.iter().map(String::as_str))
            .filter_map(|name| self.backend(name))
            .collect()
    }

    /// Pick the model for `query`.
    ///
    /// The primary wins when it is available and the query either scores at
    /// or above the complexity threshold or fits under the token threshold.
    /// Otherwise the first available fallback is used.
    pub async fn select_model(&self, query: &str) -> Result<String, ProviderError> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(ProviderError::AllModelsExhausted { attempts: vec![] });
        }

        let complexity = score_complexity(query);
        let primary = &candidates[0];
        let tokens = primary.provider.count_tokens(query);

        debug!(
            complexity,
            tokens,
            primary = %primary.model,
            "routing query"
        );

        if primary.provider.is_available().await
            && (complexity >= self.config.complexity_threshold
                || tokens <= self.config.token_threshold)
        {
            return Ok(primary.model.clone());
        }

        for backend in &candidates[1..] {
            if backend.provider.is_available().await {
                info!(model = %backend.model, "primary unsuitable, using fallback");
                return Ok(backend.model.clone());
            }
        }

        Err(ProviderError::AllModelsExhausted {
            attempts: candidates.iter().map(|b| b.model.clone()).collect(),
        })
    }

    /// Attempt order for a request: the selected model first, then the
    /// remaining candidates in config order.
    fn attempt_order(&self, selected: &str) -> Vec<&ModelBackend> {
        let mut order: Vec<&ModelBackend> = Vec::new();
        if let Some(b) = self.backend(selected) {
            order.push(b);
        }
        for b in self.candidates() {
            if b.model != selected {
                order.push(b);
            }
        }
        order
    }

    /// Generate a completion for `messages`, routed by `query`.
    ///
    /// Walks the fallback list on transient failures. The returned
    /// response names the model that actually produced it.
    pub async fn generate(
        &self,
        query: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatResponse, ProviderError> {
        let selected = self.select_model(query).await?;
        let mut attempts: Vec<String> = Vec::new();

        for backend in self.attempt_order(&selected) {
            let request = ChatRequest::new(backend.model.clone(), messages.clone());
            match backend.provider.complete(&request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !is_failover_eligible(&err) {
                        return Err(err);
                    }
                    warn!(model = %backend.model, error = %err, "model failed, trying next");
                    attempts.push(format!("{}: {err}", backend.model));
                }
            }
        }

        Err(ProviderError::AllModelsExhausted { attempts })
    }

    /// Streaming variant of [`generate`](Self::generate).
    ///
    /// When a model fails after the stream has started, a visible
    /// `"[Switching to fallback model: ...]"` delta is emitted before the
    /// fallback's output so clients can surface the degraded mode.
    pub async fn generate_stream(
        &self,
        query: &str,
        messages: Vec<ChatMessage>,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<String, ProviderError> {
        let selected = self.select_model(query).await?;
        let mut attempts: Vec<String> = Vec::new();
        let mut switched = false;

        for backend in self.attempt_order(&selected) {
            if switched {
                let notice = format!("[Switching to fallback model: {}]", backend.model);
                if tx.send(StreamChunk::TextDelta(notice)).await.is_err() {
                    return Ok(backend.model.clone());
                }
            }

            let request = ChatRequest::new(backend.model.clone(), messages.clone());
            match backend.provider.complete_stream(&request, tx.clone()).await {
                Ok(()) => return Ok(backend.model.clone()),
                Err(err) => {
                    if !is_failover_eligible(&err) {
                        return Err(err);
                    }
                    warn!(model = %backend.model, error = %err, "streaming failed, trying next");
                    attempts.push(format!("{}: {err}", backend.model));
                    switched = true;
                }
            }
        }

        Err(ProviderError::AllModelsExhausted { attempts })
    }
}
