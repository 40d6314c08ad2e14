//! Native provider for a local Ollama daemon.
//!
//! Talks to the Ollama HTTP API at `{base_url}/api`: `/tags` for installed
//! models, `/pull` to fetch missing ones, `/chat` and `/generate` for
//! completions, and `/embeddings` for the vector memory layer. Beyond chat,
//! the daemon also hosts the image and video diffusion model families, so
//! this provider carries the whole local model catalog.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::types::{AvailableModels, ChatRequest, ChatResponse, StreamChunk, Usage};

/// Prompt keywords that route to the code model.
const CODE_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "programming",
    "python",
    "javascript",
    "java",
    "c++",
    "html",
    "css",
];

/// Prompt keywords that route long-form reasoning to the secondary model.
const REASONING_KEYWORDS: &[&str] = &[
    "explain",
    "analyze",
    "compare",
    "contrast",
    "evaluate",
    "synthesize",
];

/// The model families served by the local daemon.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    /// General-purpose text model.
    pub text_primary: String,
    /// Larger model for long or reasoning-heavy prompts.
    pub text_secondary: String,
    /// Code-specialized model.
    pub text_code: String,
    /// Primary image diffusion model.
    pub image_primary: String,
    /// Artistic-style image model.
    pub image_artistic: String,
    /// Image fallback when the primary fails.
    pub image_fallback: String,
    /// Primary video diffusion model.
    pub video_primary: String,
    /// Animation-specialized video model.
    pub video_animation: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            text_primary: "mistral:7b-instruct-v0.3".into(),
            text_secondary: "mixtral:8x7b-instruct-v0.1".into(),
            text_code: "codellama:7b-instruct".into(),
            image_primary: "stable-diffusion-xl".into(),
            image_artistic: "playground-v2".into(),
            image_fallback: "stable-diffusion".into(),
            video_primary: "stable-video-diffusion".into(),
            video_animation: "animatediff".into(),
        }
    }
}

impl ModelCatalog {
    /// All models in the catalog, for install checks.
    fn all(&self) -> Vec<&str> {
        vec![
            &self.text_primary,
            &self.text_secondary,
            &self.text_code,
            &self.image_primary,
            &self.image_artistic,
            &self.image_fallback,
            &self.video_primary,
            &self.video_animation,
        ]
    }

    /// The `{text, image, video}` family listing.
    pub fn available(&self) -> AvailableModels {
        AvailableModels {
            text: vec![
                self.text_primary.clone(),
                self.text_secondary.clone(),
                self.text_code.clone(),
            ],
            image: vec![
                self.image_primary.clone(),
                self.image_artistic.clone(),
                self.image_fallback.clone(),
            ],
            video: vec![self.video_primary.clone(), self.video_animation.clone()],
        }
    }

    /// Pick a text model for `prompt`.
    ///
    /// Code keywords win over everything. Prompts over 50 words, or ones
    /// asking for analysis/synthesis, go to the secondary model. Everything
    /// else uses the primary.
    pub fn select_text_model(&self, prompt: &str) -> &str {
        let lower = prompt.to_lowercase();
        if CODE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return &self.text_code;
        }
        let word_count = prompt.split_whitespace().count();
        if word_count > 50 || REASONING_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return &self.text_secondary;
        }
        &self.text_primary
    }
}

/// An LLM provider backed by a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    http: reqwest::Client,
    catalog: ModelCatalog,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// A `/chat` response line. With `stream: false` the daemon sends exactly
/// one of these; with streaming it sends one JSON object per line.
#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ChatLineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatLineMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaProvider {
    /// Create a provider for the daemon at `base_url` with the default
    /// model catalog.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_catalog(base_url, ModelCatalog::default())
    }

    /// Create a provider with a custom model catalog.
    pub fn with_catalog(base_url: impl Into<String>, catalog: ModelCatalog) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            catalog,
        }
    }

    /// The model catalog this provider serves.
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    /// Map a non-success response to a [`ProviderError`].
    async fn error_from_response(&self, model: &str, response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status == 404 {
            return ProviderError::ModelNotFound {
                provider: "ollama".into(),
                model: model.into(),
            };
        }
        ProviderError::Api {
            status,
            message: body,
        }
    }

    /// Names of all models installed on the daemon (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self.http.get(self.api_url("/tags")).send().await?;
        if !response.status().is_success() {
            return Err(self.error_from_response("", response).await);
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("bad tags response: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Pull `model` onto the daemon (`POST /api/pull`).
    pub async fn pull(&self, model: &str) -> Result<()> {
        info!(model, "pulling model");
        let response = self
            .http
            .post(self.api_url("/pull"))
            .json(&serde_json::json!({ "name": model, "stream": false }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(model, response).await);
        }
        Ok(())
    }

    /// Pull any catalog model missing from the daemon.
    ///
    /// Individual pull failures are logged and skipped so that one broken
    /// model name does not block startup.
    pub async fn ensure_models(&self) -> Result<()> {
        let installed = self.list_models().await?;
        for model in self.catalog.all() {
            if installed.iter().any(|m| m == model) {
                continue;
            }
            if let Err(e) = self.pull(model).await {
                warn!(model, error = %e, "model pull failed, continuing");
            }
        }
        Ok(())
    }

    /// Run a bare prompt through `model` (`POST /api/generate`).
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        debug!(model, "generate request");
        let response = self
            .http
            .post(self.api_url("/generate"))
            .json(&serde_json::json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(model, response).await);
        }
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("bad generate response: {e}")))?;
        Ok(body.response)
    }

    /// Generate an image for `prompt`, retrying once on the family fallback.
    ///
    /// Returns the base64-encoded image payload produced by the model.
    pub async fn generate_image(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let primary = model.unwrap_or(&self.catalog.image_primary);
        match self.generate(primary, prompt).await {
            Ok(image) => Ok(image),
            Err(e) if self.catalog.image_fallback != primary => {
                warn!(model = primary, error = %e, "image generation failed, trying fallback");
                self.generate(&self.catalog.image_fallback, prompt).await
            }
            Err(e) => Err(e),
        }
    }

    /// Generate a video for `prompt`, retrying once on the family fallback.
    ///
    /// Returns the base64-encoded video payload produced by the model.
    pub async fn generate_video(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let primary = model.unwrap_or(&self.catalog.video_primary);
        match self.generate(primary, prompt).await {
            Ok(video) => Ok(video),
            // The video family falls back to its own primary, so only retry
            // when an explicit model was requested.
            Err(e) if self.catalog.video_primary != primary => {
                warn!(model = primary, error = %e, "video generation failed, trying fallback");
                self.generate(&self.catalog.video_primary, prompt).await
            }
            Err(e) => Err(e),
        }
    }

    /// Embed `prompt` with `model` (`POST /api/embeddings`).
    pub async fn embeddings(&self, model: &str, prompt: &str) -> Result<Vec<f32>> {
        let response = self
            .http
            .post(self.api_url("/embeddings"))
            .json(&serde_json::json!({ "model": model, "prompt": prompt }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(model, response).await);
        }
        let body: EmbeddingsResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("bad embeddings response: {e}"))
        })?;
        if body.embedding.is_empty() {
            return Err(ProviderError::InvalidResponse("empty embedding".into()));
        }
        Ok(body.embedding)
    }

    /// The `{text, image, video}` family listing for the API.
    pub fn available_models(&self) -> AvailableModels {
        self.catalog.available()
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        match self.http.get(self.api_url("/tags")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(
            provider = "ollama",
            model = %request.model,
            messages = request.messages.len(),
            "sending chat request"
        );

        let response = self
            .http
            .post(self.api_url("/chat"))
            .json(&serde_json::json!({
                "model": request.model,
                "messages": request.messages,
                "stream": false,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(&request.model, response).await);
        }

        let line: ChatLine = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("bad chat response: {e}")))?;

        let content = line
            .message
            .map(|m| m.content)
            .ok_or_else(|| ProviderError::InvalidResponse("missing message field".into()))?;

        let usage = match (line.prompt_eval_count, line.eval_count) {
            (None, None) => None,
            (p, c) => {
                let prompt = p.unwrap_or(0);
                let completion = c.unwrap_or(0);
                Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                })
            }
        };

        Ok(ChatResponse {
            content,
            model: line.model.unwrap_or_else(|| request.model.clone()),
            usage,
        })
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<()> {
        debug!(provider = "ollama", model = %request.model, "sending streaming chat request");

        let response = self
            .http
            .post(self.api_url("/chat"))
            .json(&serde_json::json!({
                "model": request.model,
                "messages": request.messages,
                "stream": true,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(&request.model, response).await);
        }

        // Ollama streams newline-delimited JSON, one object per line.
        use futures_util::StreamExt;
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes =
                chunk_result.map_err(|e| ProviderError::Stream(format!("read error: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].to_string();
                buffer = buffer[newline_pos + 1..].to_string();
                if line.trim().is_empty() {
                    continue;
                }

                let parsed: ChatLine = match serde_json::from_str(&line) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(provider = "ollama", error = %e, "bad stream line, skipping");
                        continue;
                    }
                };

                if let Some(msg) = parsed.message
                    && !msg.content.is_empty()
                    && tx.send(StreamChunk::TextDelta(msg.content)).await.is_err()
                {
                    debug!(provider = "ollama", "stream receiver dropped, stopping");
                    return Ok(());
                }
                if parsed.done {
                    let _ = tx.send(StreamChunk::Done).await;
                    return Ok(());
                }
            }
        }

        let _ = tx.send(StreamChunk::Done).await;
        Ok(())
    }
}
