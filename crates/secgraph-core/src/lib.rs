//! Secgraph Core Library
//!
//! This crate provides the core functionality for secgraph, including:
//! - Typed knowledge graph model and SQLite-backed store
//! - Entity resolution and bounded breadth-first neighborhood expansion
//! - Context ranking and trimming into grounded context bundles
//! - Durable multi-turn conversations with per-conversation serialization
//! - Prompt composition and completion-backed answer generation

pub mod api;
pub mod chat;
pub mod compose;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod retrieval;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::KnowledgeService;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::graph::{Edge, Node, NodeType, Relation};
    pub use crate::retrieval::ContextBundle;
}
