//! Durable multi-turn conversations
//!
//! Conversations and their turns are persisted in SQLite. The
//! [`ConversationManager`] serializes turn appends per conversation so
//! concurrent questions on one conversation apply in arrival order and a
//! delete waits for any in-flight turn.

pub mod conversation;
pub mod manager;
pub mod repository;

pub use conversation::{Answer, AnswerLink, AnswerSections, Conversation, Turn, title_from_question};
pub use manager::ConversationManager;
pub use repository::{ConversationRepository, TurnRepository};
