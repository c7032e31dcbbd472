//! Conversation repositories
//!
//! Database operations for conversations and turns. Answer and context
//! payloads are stored as JSON text columns.

use chrono::Utc;
use sqlx::Row;

use crate::Result;
use crate::chat::conversation::{Answer, Conversation, Turn};
use crate::retrieval::ContextBundle;
use crate::storage::Database;

/// Conversation repository for database operations
pub struct ConversationRepository<'a> {
    db: &'a Database,
}

impl<'a> ConversationRepository<'a> {
    /// Create a new conversation repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new conversation in the database
    pub async fn create(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, title, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&conversation.id)
        .bind(&conversation.title)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Get a conversation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let row =
            sqlx::query("SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(|r| Self::row_to_conversation(&r)))
    }

    /// List all conversations, most recently updated first
    pub async fn list(&self) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations ORDER BY updated_at DESC, id ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(Self::row_to_conversation).collect())
    }

    /// Check if a conversation exists
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.is_some())
    }

    /// Delete a conversation and all its turns in one transaction
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM turns WHERE conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Convert a database row to a Conversation
    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Conversation {
        Conversation {
            id: row.get("id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Turn repository for database operations
pub struct TurnRepository<'a> {
    db: &'a Database,
}

impl<'a> TurnRepository<'a> {
    /// Create a new turn repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a turn and touch the conversation, atomically
    ///
    /// A dropped caller cannot leave a half-written turn behind: the
    /// insert and the updated_at bump commit together or not at all.
    pub async fn create(&self, turn: &Turn) -> Result<()> {
        let answer = serde_json::to_string(&turn.answer)?;
        let context = serde_json::to_string(&turn.context)?;

        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO turns (id, conversation_id, question, answer, context, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&turn.id)
        .bind(&turn.conversation_id)
        .bind(&turn.question)
        .bind(&answer)
        .bind(&context)
        .bind(turn.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(&turn.conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// List all turns in a conversation, oldest first
    pub async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, question, answer, context, created_at FROM turns WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    /// Get the most recent turns in a conversation, in chronological order
    pub async fn list_recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, question, answer, context, created_at FROM turns WHERE conversation_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await?;

        let mut turns: Vec<Turn> = rows.iter().map(Self::row_to_turn).collect::<Result<_>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Count turns in a conversation
    pub async fn count_by_conversation(&self, conversation_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turns WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.0)
    }

    /// Convert a database row to a Turn
    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn> {
        let answer: String = row.get("answer");
        let context: String = row.get("context");
        let answer: Answer = serde_json::from_str(&answer)?;
        let context: ContextBundle = serde_json::from_str(&context)?;

        Ok(Turn {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            question: row.get("question"),
            answer,
            context,
            created_at: row.get("created_at"),
        })
    }
}
