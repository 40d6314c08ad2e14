//! The core [`Provider`] trait for chat completions.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse, StreamChunk};

/// A backend that can execute chat completion requests.
///
/// Implementations handle the protocol details for a specific API
/// (authentication, request formatting, response parsing). The two shipped
/// implementations are [`OpenAiProvider`](crate::openai::OpenAiProvider)
/// and [`OllamaProvider`](crate::ollama::OllamaProvider).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider name (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    /// Whether the provider is reachable and configured.
    ///
    /// Used by the router to skip backends that cannot serve requests
    /// (missing API key, daemon not running) without burning a request.
    async fn is_available(&self) -> bool;

    /// Execute a chat completion request and return the response.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`](crate::error::ProviderError) if the request
    /// fails due to network issues, authentication problems, rate limiting,
    /// or invalid responses.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Execute a streaming chat completion, sending chunks through `tx`.
    ///
    /// The implementation must send [`StreamChunk::Done`] (or return an
    /// error) before resolving. A dropped receiver ends the stream cleanly.
    async fn complete_stream(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<()>;

    /// Count tokens in `text` for this provider's tokenizer.
    ///
    /// The default is a whitespace estimate, good enough for routing
    /// decisions when no real tokenizer is available.
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// The context window for `model`, in tokens.
    fn max_tokens(&self, _model: &str) -> usize {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: "ok".into(),
                model: "stub-model".into(),
                usage: None,
            })
        }

        async fn complete_stream(
            &self,
            _request: &ChatRequest,
            tx: mpsc::Sender<StreamChunk>,
        ) -> Result<()> {
            let _ = tx.send(StreamChunk::Done).await;
            Ok(())
        }
    }

    #[test]
    fn default_count_tokens_is_word_count() {
        let p = StubProvider;
        assert_eq!(p.count_tokens("one two three"), 3);
        assert_eq!(p.count_tokens(""), 0);
    }

    #[test]
    fn default_max_tokens() {
        let p = StubProvider;
        assert_eq!(p.max_tokens("anything"), 4096);
    }
}
