//! OpenAI-compatible provider implementation.
//!
//! [`OpenAiProvider`] works with any API that follows the OpenAI chat
//! completion format by changing `base_url`. Token counting uses the
//! cl100k_base tokenizer so routing decisions match what the API bills.

use async_trait::async_trait;
use serde::Deserialize;
use tiktoken_rs::CoreBPE;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::sse::parse_sse_line;
use crate::types::{ChatMessage, ChatRequest, ChatResponse, StreamChunk, Usage};

/// Env var checked for the API key when none is set explicitly.
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Context windows for known models. Unknown models get 4096.
const MODEL_TOKEN_LIMITS: &[(&str, usize)] = &[
    ("gpt-4", 8192),
    ("gpt-4-turbo", 128_000),
    ("gpt-3.5-turbo", 4096),
    ("gpt-3.5-turbo-16k", 16_384),
];

/// An LLM provider speaking the OpenAI chat completion API.
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    bpe: Option<CoreBPE>,
}

impl OpenAiProvider {
    /// Create a provider for `base_url`.
    ///
    /// The API key is resolved from the `OPENAI_API_KEY` env var at request
    /// time unless one is supplied via [`with_api_key`](Self::with_api_key).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            http: reqwest::Client::new(),
            bpe: tiktoken_rs::cl100k_base().ok(),
        }
    }

    /// Create a provider with an explicit API key, bypassing the env lookup.
    pub fn with_api_key(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::new(base_url)
        }
    }

    /// Returns the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Resolve the API key: explicit key > environment variable.
    fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(API_KEY_ENV)
            .map_err(|_| ProviderError::NotConfigured(format!("set {API_KEY_ENV} env var")))
    }

    /// Map a non-success HTTP response to a [`ProviderError`].
    async fn error_from_response(
        &self,
        model: &str,
        response: reqwest::Response,
    ) -> ProviderError {
        let status = response.status().as_u16();

        if status == 429 {
            let header_ms = parse_retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            let quota_exhausted = is_quota_exhausted(&body);
            if quota_exhausted {
                warn!(provider = "openai", "quota exhausted (not retryable)");
            } else {
                warn!(provider = "openai", body = %body, "rate limited");
            }
            let message = extract_error_message(&body)
                .unwrap_or_else(|| "rate limit exceeded".into());
            return ProviderError::RateLimited {
                message,
                retry_after_ms: header_ms.or_else(|| parse_retry_after_ms(&body)),
                quota_exhausted,
            };
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body).unwrap_or(body);

        match status {
            401 | 403 => ProviderError::AuthFailed(message),
            404 => ProviderError::ModelNotFound {
                provider: "openai".into(),
                model: model.into(),
            },
            _ => ProviderError::Api { status, message },
        }
    }
}

/// The OpenAI wire response (`chat.completion`).
#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: ChatMessage,
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn is_available(&self) -> bool {
        self.resolve_api_key().is_ok()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();

        debug!(
            provider = "openai",
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from_response(&request.model, response).await);
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("empty choices array".into()))?;

        debug!(provider = "openai", model = %wire.model, "chat completion response received");

        Ok(ChatResponse {
            content: choice.message.content,
            model: wire.model,
            usage: wire.usage,
        })
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<()> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();

        debug!(
            provider = "openai",
            model = %request.model,
            "sending streaming chat completion request"
        );

        let mut stream_request = request.clone();
        stream_request.stream = Some(true);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&stream_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from_response(&request.model, response).await);
        }

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

                let chunks = match parse_sse_line(&line) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(provider = "openai", error = %e, "SSE parse error, skipping line");
                        continue;
                    }
                };

                for chunk in chunks {
                    trace!(provider = "openai", chunk = ?chunk, "streaming chunk");
                    if tx.send(chunk).await.is_err() {
                        debug!(provider = "openai", "stream receiver dropped, stopping");
                        return Ok(());
                    }
                }
            }
        }

        // Flush anything left in the buffer.
        if !buffer.trim().is_empty()
            && let Ok(chunks) = parse_sse_line(&buffer)
        {
            for chunk in chunks {
                let _ = tx.send(chunk).await;
            }
        }

        debug!(provider = "openai", "streaming complete");
        Ok(())
    }

    fn count_tokens(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.split_whitespace().count(),
        }
    }

    fn max_tokens(&self, model: &str) -> usize {
        MODEL_TOKEN_LIMITS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, limit)| *limit)
            .unwrap_or(4096)
    }
}

/// Check if a 429 body indicates permanent quota/credit exhaustion rather
/// than a transient rate limit.
fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("exhausted")
        || lower.contains("spending limit")
        || lower.contains("credits")
        || lower.contains("billing")
        || lower.contains("quota exceeded")
        || lower.contains("insufficient_quota")
}

/// Extract a human-readable error message from a JSON error body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("error").and_then(|v| {
        v.get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .or_else(|| v.as_str().map(String::from))
    })
}

/// Extract a retry-after value from the HTTP `Retry-After` header.
///
/// Only the numeric (seconds) form is handled; HTTP-date is rare for APIs.
fn parse_retry_after_header(response: &reqwest::Response) -> Option<u64> {
    let header_val = response
        .headers()
        .get("retry-after")
        .or_else(|| response.headers().get("x-ratelimit-reset-after"))
        .and_then(|v| v.to_str().ok())?;

    header_val
        .parse::<f64>()
        .ok()
        .map(|secs| (secs * 1000.0).max(0.0) as u64)
}

/// Extract a retry-after value from a JSON error body.
fn parse_retry_after_ms(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after_ms")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            value
                .get("retry_after")
                .and_then(|v| v.as_f64())
                .map(|secs| (secs * 1000.0) as u64)
        })
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
