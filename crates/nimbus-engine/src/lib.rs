//! Core engine for the nimbus assistant platform.
//!
//! Wires together model routing, SQLite persistence, vector memory,
//! context retrieval, and performance tracking behind the [`Engine`]
//! facade that the gateway and CLI drive.

pub mod complexity;
pub mod engine;
pub mod metrics;
pub mod persistence;
pub mod prompts;
pub mod retrieval;
pub mod router;
pub mod vector;

pub use engine::{ChatOutcome, Engine};
pub use metrics::{MetricsSummary, PerformanceTracker};
pub use persistence::Store;
pub use retrieval::{ContextRetrieval, RetrievedContext};
pub use router::ModelRouter;
pub use vector::{Embedder, OllamaEmbedder, SearchHit, VectorIndex};
