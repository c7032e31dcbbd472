//! Completion collaborator integration
//!
//! The engine treats answer generation as an opaque collaborator behind
//! the [`CompletionClient`] trait; [`HttpCompletionClient`] talks to any
//! OpenAI-compatible chat completions endpoint.

pub mod client;
pub mod types;

pub use client::{CompletionClient, HttpCompletionClient, HttpCompletionClientBuilder};
pub use types::{ChatRequest, ChatResponse, Message, MessageRole};
