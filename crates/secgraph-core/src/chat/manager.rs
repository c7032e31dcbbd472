//! Conversation manager
//!
//! Owns the conversation repositories and an arena of per-conversation
//! gates. Everything that mutates one conversation (appending a turn,
//! deleting it) runs under that conversation's gate, so concurrent
//! appends apply in arrival order and a delete waits for an in-flight
//! turn. Different conversations never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

use crate::chat::conversation::{Answer, Conversation, Turn};
use crate::chat::repository::{ConversationRepository, TurnRepository};
use crate::error::{Error, Result};
use crate::retrieval::ContextBundle;
use crate::storage::Database;

/// Manager for durable conversations with per-conversation serialization
pub struct ConversationManager {
    db: Database,
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConversationManager {
    /// Create a new manager on top of an open database
    pub fn new(db: Database) -> Self {
        Self {
            db,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the gate for a conversation id
    fn gate(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the conversation's gate
    ///
    /// The tokio mutex queues waiters fairly, so callers acquire in
    /// arrival order. Hold the guard across the whole compose-and-persist
    /// sequence.
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        self.gate(id).lock_owned().await
    }

    /// Create a new conversation
    pub async fn create(&self, title: &str) -> Result<Conversation> {
        let conversation = Conversation::new(title);
        ConversationRepository::new(&self.db)
            .create(&conversation)
            .await?;
        info!(conversation_id = %conversation.id, title = %conversation.title, "Created conversation");
        Ok(conversation)
    }

    /// Get a conversation, erroring if it does not exist
    pub async fn get(&self, id: &str) -> Result<Conversation> {
        ConversationRepository::new(&self.db)
            .get(id)
            .await?
            .ok_or_else(|| Error::ConversationNotFound(id.to_string()))
    }

    /// List all conversations, most recently updated first
    pub async fn list(&self) -> Result<Vec<Conversation>> {
        ConversationRepository::new(&self.db).list().await
    }

    /// All turns of a conversation, oldest first
    pub async fn turns(&self, id: &str) -> Result<Vec<Turn>> {
        if !ConversationRepository::new(&self.db).exists(id).await? {
            return Err(Error::ConversationNotFound(id.to_string()));
        }
        TurnRepository::new(&self.db).list_by_conversation(id).await
    }

    /// The most recent turns of a conversation, in chronological order
    pub async fn recent_turns(&self, id: &str, limit: usize) -> Result<Vec<Turn>> {
        TurnRepository::new(&self.db).list_recent(id, limit).await
    }

    /// Persist a completed turn
    ///
    /// Callers must hold the conversation's gate.
    pub async fn record_turn(
        &self,
        conversation_id: &str,
        question: &str,
        answer: Answer,
        context: ContextBundle,
    ) -> Result<Turn> {
        let turn = Turn::new(conversation_id, question, answer, context);
        TurnRepository::new(&self.db).create(&turn).await?;
        Ok(turn)
    }

    /// Delete a conversation and all its turns
    ///
    /// Waits for any in-flight turn on the same conversation before
    /// deleting. The removal is atomic; a concurrent reader sees the
    /// conversation either fully present or fully gone.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock(id).await;

        let deleted = ConversationRepository::new(&self.db).delete(id).await?;
        if !deleted {
            return Err(Error::ConversationNotFound(id.to_string()));
        }

        // Drop the gate entry; a recreated id gets a fresh gate
        if let Ok(mut gates) = self.gates.lock() {
            gates.remove(id);
        }

        info!(conversation_id = %id, "Deleted conversation");
        Ok(())
    }

    /// Get the underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }
}
