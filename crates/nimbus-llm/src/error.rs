//! Provider error types for nimbus-llm.
//!
//! All provider operations return [`Result<T>`] which uses [`ProviderError`]
//! as the error type. [`ProviderError::is_retryable`] classifies errors for
//! the retry and fallback layers.

use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider has not been configured (e.g. missing API key).
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The requested model does not exist on the provider.
    #[error("model not found on {provider}: {model}")]
    ModelNotFound {
        /// Provider name.
        provider: String,
        /// Model that was requested.
        model: String,
    },

    /// Authentication with the provider was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The provider returned a rate-limit response (HTTP 429).
    ///
    /// `quota_exhausted` marks billing/credit exhaustion, which will not
    /// resolve with retries.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Provider-supplied message.
        message: String,
        /// Suggested wait before retrying, in milliseconds.
        retry_after_ms: Option<u64>,
        /// True when the 429 is a permanent quota/billing failure.
        quota_exhausted: bool,
    },

    /// The request timed out.
    #[error("timeout after {seconds}s")]
    Timeout {
        /// How long the request ran before timing out.
        seconds: u64,
    },

    /// An HTTP-level error from reqwest.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status.
    #[error("api error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or extracted error message.
        message: String,
    },

    /// The provider returned a response that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A streaming read failed mid-stream.
    #[error("stream error: {0}")]
    Stream(String),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every configured model (primary and fallbacks) failed.
    #[error("all models exhausted after trying: {}", attempts.join(", "))]
    AllModelsExhausted {
        /// Names of the models that were attempted, in order.
        attempts: Vec<String>,
    },
}

impl ProviderError {
    /// Whether retrying the same model may succeed.
    ///
    /// Transient failures (rate limits, timeouts, transport errors, 5xx)
    /// are retryable. Configuration, auth, and parse failures are not, and
    /// neither is a quota-exhausted 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited {
                quota_exhausted, ..
            } => !quota_exhausted,
            ProviderError::Timeout { .. } => true,
            ProviderError::Http(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Stream(_) => true,
            ProviderError::NotConfigured(_)
            | ProviderError::ModelNotFound { .. }
            | ProviderError::AuthFailed(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::Json(_)
            | ProviderError::AllModelsExhausted { .. } => false,
        }
    }
}

/// A convenience type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_configured() {
        let err = ProviderError::NotConfigured("set OPENAI_API_KEY env var".into());
        assert_eq!(
            err.to_string(),
            "provider not configured: set OPENAI_API_KEY env var"
        );
    }

    #[test]
    fn display_model_not_found() {
        let err = ProviderError::ModelNotFound {
            provider: "ollama".into(),
            model: "mistral:7b-instruct-v0.3".into(),
        };
        assert_eq!(
            err.to_string(),
            "model not found on ollama: mistral:7b-instruct-v0.3"
        );
    }

    #[test]
    fn display_rate_limited() {
        let err = ProviderError::RateLimited {
            message: "slow down".into(),
            retry_after_ms: Some(5000),
            quota_exhausted: false,
        };
        assert_eq!(err.to_string(), "rate limited: slow down");
    }

    #[test]
    fn display_timeout() {
        let err = ProviderError::Timeout { seconds: 30 };
        assert_eq!(err.to_string(), "timeout after 30s");
    }

    #[test]
    fn display_api_error() {
        let err = ProviderError::Api {
            status: 500,
            message: "internal".into(),
        };
        assert_eq!(err.to_string(), "api error (HTTP 500): internal");
    }

    #[test]
    fn display_all_models_exhausted() {
        let err = ProviderError::AllModelsExhausted {
            attempts: vec!["gpt-4".into(), "gpt-3.5-turbo".into()],
        };
        assert_eq!(
            err.to_string(),
            "all models exhausted after trying: gpt-4, gpt-3.5-turbo"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::RateLimited {
            message: "throttled".into(),
            retry_after_ms: Some(100),
            quota_exhausted: false,
        }
        .is_retryable());
        assert!(ProviderError::Timeout { seconds: 10 }.is_retryable());
        assert!(ProviderError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(ProviderError::Stream("connection reset".into()).is_retryable());
    }

    #[test]
    fn not_retryable_classification() {
        assert!(!ProviderError::AuthFailed("bad key".into()).is_retryable());
        assert!(!ProviderError::NotConfigured("no key".into()).is_retryable());
        assert!(!ProviderError::ModelNotFound {
            provider: "openai".into(),
            model: "gpt-9".into(),
        }
        .is_retryable());
        assert!(!ProviderError::InvalidResponse("missing choices".into()).is_retryable());
        assert!(!ProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
    }

    #[test]
    fn quota_exhausted_is_not_retryable() {
        let err = ProviderError::RateLimited {
            message: "insufficient_quota".into(),
            retry_after_ms: None,
            quota_exhausted: true,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn json_error_from_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let provider_err: ProviderError = serde_err.into();
        assert!(provider_err.to_string().starts_with("json error:"));
    }
}
