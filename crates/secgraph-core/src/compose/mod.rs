//! Prompt composition and answer generation
//!
//! Renders a context bundle and recent conversation history into chat
//! messages, drives the completion collaborator under a hard timeout with
//! one retry, and validates the reply into a structured or narrative
//! answer.

pub mod composer;
pub mod prompt;

pub use composer::{AnswerComposer, ComposerConfig, FAILURE_NOTICE};
pub use prompt::{AnswerMode, build_messages, render_context};
