//! LLM provider abstraction for nimbus.
//!
//! Defines the [`Provider`] trait plus two implementations:
//!
//! - [`OpenAiProvider`] for any endpoint speaking the OpenAI chat
//!   completion format
//! - [`OllamaProvider`] for a local Ollama daemon, including the image and
//!   video model families and embeddings
//!
//! [`RetryPolicy`] wraps any provider with exponential-backoff retries.

pub mod error;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod sse;
pub mod types;

pub use error::{ProviderError, Result};
pub use ollama::{ModelCatalog, OllamaProvider};
pub use openai::OpenAiProvider;
pub use provider::Provider;
pub use retry::{RetryConfig, RetryPolicy};
pub use types::{ChatMessage, ChatRequest, ChatResponse, StreamChunk, Usage};
