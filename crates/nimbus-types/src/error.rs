//! Error types for the nimbus platform.
//!
//! Provides [`NimbusError`] as the top-level error type shared across the
//! engine, gateway, and CLI. It is non-exhaustive to allow future extension
//! without breaking downstream.

use thiserror::Error;

/// Top-level error type for the nimbus platform.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NimbusError {
    /// Configuration is missing, malformed, or semantically invalid.
    #[error("invalid config: {reason}")]
    Config {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// A database read or write failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A model provider failed after all fallbacks were tried.
    #[error("provider error: {0}")]
    Provider(String),

    /// The vector memory layer failed (embedding or index access).
    #[error("memory error: {0}")]
    Memory(String),

    /// A requested resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Identifier of the missing resource.
        resource: String,
    },

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience alias used throughout the platform.
pub type Result<T> = std::result::Result<T, NimbusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = NimbusError::Config {
            reason: "port out of range".into(),
        };
        assert_eq!(err.to_string(), "invalid config: port out of range");
    }

    #[test]
    fn not_found_display() {
        let err = NimbusError::NotFound {
            resource: "conversation abc123".into(),
        };
        assert_eq!(err.to_string(), "not found: conversation abc123");
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: NimbusError = io_err.into();
        assert!(matches!(err, NimbusError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad}}").unwrap_err();
        let err: NimbusError = json_err.into();
        assert!(matches!(err, NimbusError::Serialization(_)));
    }

    #[test]
    fn result_alias_works() {
        fn ok_fn() -> Result<i32> {
            Ok(7)
        }
        fn err_fn() -> Result<i32> {
            Err(NimbusError::Persistence("locked".into()))
        }
        assert_eq!(ok_fn().unwrap(), 7);
        assert!(err_fn().is_err());
    }
}
