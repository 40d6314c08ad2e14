//! Platform configuration.
//!
//! Loaded from a TOML file (default `~/.nimbus/config.toml`), then overlaid
//! with environment variables so deployments can configure the server
//! without touching the file. A missing file yields defaults; a malformed
//! file is an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NimbusError, Result};

/// Top-level platform configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NimbusConfig {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub providers: ProvidersConfig,
    pub memory: MemoryConfig,
    pub tracking: TrackingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means permissive.
    pub cors_origins: Vec<String>,
    /// Shared secret required to mint API tokens. `None` disables the check.
    pub auth_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            cors_origins: Vec::new(),
            auth_secret: None,
        }
    }
}

/// Model routing thresholds and the ordered model list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Preferred model for complex queries.
    pub primary_model: String,
    /// Ordered fallbacks tried when the primary is unavailable or fails.
    pub fallback_models: Vec<String>,
    /// Queries scoring at or above this (1-10) favor the primary model.
    pub complexity_threshold: u8,
    /// Queries at or under this token count may use the primary model.
    pub token_threshold: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary_model: "gpt-4".into(),
            fallback_models: vec!["gpt-3.5-turbo".into(), "mistral:7b-instruct-v0.3".into()],
            complexity_threshold: 7,
            token_threshold: 2000,
        }
    }
}

/// Per-provider connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub ollama: OllamaConfig,
}

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Explicit API key. The `OPENAI_API_KEY` env var takes precedence.
    pub api_key: Option<String>,
    pub api_base: String,
    pub default_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".into(),
            default_model: "gpt-4".into(),
        }
    }
}

/// Local Ollama daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
        }
    }
}

/// Conversation persistence and vector memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// SQLite database path. `None` resolves to `~/.nimbus/nimbus.db`.
    pub db_path: Option<PathBuf>,
    /// Ollama model used for embeddings.
    pub embedding_model: String,
    /// When false, retrieval and learning extraction are skipped.
    pub enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            embedding_model: "nomic-embed-text".into(),
            enabled: true,
        }
    }
}

/// Performance tracking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    /// Metrics JSON path. `None` resolves to `~/.nimbus/metrics.json`.
    pub metrics_path: Option<PathBuf>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_path: None,
        }
    }
}

impl NimbusConfig {
    /// Default config file location: `~/.nimbus/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nimbus")
            .join("config.toml")
    }

    /// Directory for runtime state (database, metrics).
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nimbus")
    }

    /// Load config from `path`, falling back to defaults when the file does
    /// not exist, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| NimbusError::Config {
                reason: format!("{}: {e}", path.display()),
            })?
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay environment variables on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                self.server.auth_secret = Some(secret);
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.providers.openai.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("OLLAMA_API_URL") {
            if !url.is_empty() {
                self.providers.ollama.base_url = url;
            }
        }
        if let Ok(flag) = std::env::var("ENABLE_PERFORMANCE_TRACKING") {
            self.tracking.enabled = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }

    /// Resolved SQLite path.
    pub fn db_path(&self) -> PathBuf {
        self.memory
            .db_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("nimbus.db"))
    }

    /// Resolved metrics file path.
    pub fn metrics_path(&self) -> PathBuf {
        self.tracking
            .metrics_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("metrics.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = NimbusConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.routing.complexity_threshold, 7);
        assert_eq!(config.routing.token_threshold, 2000);
        assert_eq!(config.providers.ollama.base_url, "http://localhost:11434");
        assert!(config.memory.enabled);
        assert!(config.tracking.enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_env::with_vars_unset(
            ["PORT", "CORS_ORIGINS", "JWT_SECRET", "OPENAI_API_KEY", "OLLAMA_API_URL"],
            || NimbusConfig::load(&dir.path().join("nope.toml")).unwrap(),
        );
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server = \"not a table\"").unwrap();
        let err = NimbusConfig::load(&path).unwrap_err();
        assert!(matches!(err, NimbusError::Config { .. }));
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9001

[routing]
primary_model = "gpt-4-turbo"
complexity_threshold = 5
"#,
        )
        .unwrap();
        let config = temp_env::with_vars_unset(["PORT"], || NimbusConfig::load(&path).unwrap());
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.routing.primary_model, "gpt-4-turbo");
        assert_eq!(config.routing.complexity_threshold, 5);
        // Unspecified sections keep defaults.
        assert_eq!(config.routing.token_threshold, 2000);
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9001\n").unwrap();
        temp_env::with_vars(
            [
                ("PORT", Some("3000")),
                ("CORS_ORIGINS", Some("https://a.example, https://b.example")),
                ("OLLAMA_API_URL", Some("http://gpu-box:11434")),
            ],
            || {
                let config = NimbusConfig::load(&path).unwrap();
                assert_eq!(config.server.port, 3000);
                assert_eq!(
                    config.server.cors_origins,
                    vec!["https://a.example", "https://b.example"]
                );
                assert_eq!(config.providers.ollama.base_url, "http://gpu-box:11434");
            },
        );
    }

    #[test]
    fn tracking_flag_parses_truthy_values() {
        temp_env::with_var("ENABLE_PERFORMANCE_TRACKING", Some("false"), || {
            let mut config = NimbusConfig::default();
            config.apply_env_overrides();
            assert!(!config.tracking.enabled);
        });
        temp_env::with_var("ENABLE_PERFORMANCE_TRACKING", Some("yes"), || {
            let mut config = NimbusConfig::default();
            config.apply_env_overrides();
            assert!(config.tracking.enabled);
        });
    }

    #[test]
    fn resolved_paths_use_overrides() {
        let mut config = NimbusConfig::default();
        config.memory.db_path = Some(PathBuf::from("/tmp/x.db"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/x.db"));
        config.memory.db_path = None;
        assert!(config.db_path().ends_with(".nimbus/nimbus.db"));
    }
}
