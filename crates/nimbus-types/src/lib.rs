//! Shared domain types for the nimbus assistant platform.
//!
//! This crate holds the types that cross crate boundaries: conversation
//! and message models, episodic memory records, platform configuration,
//! and the top-level [`NimbusError`] type.

pub mod config;
pub mod conversation;
pub mod error;
pub mod memory;

pub use config::NimbusConfig;
pub use conversation::{Conversation, ConversationSummary, Message, Role};
pub use error::{NimbusError, Result};
pub use memory::{MemoryKind, MemoryRecord};
