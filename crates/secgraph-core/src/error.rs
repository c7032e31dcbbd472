//! Error types for secgraph

use thiserror::Error;

/// Result type alias using secgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Secgraph error types
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Entity '{0}' not found in the knowledge graph.")]
    EntityNotFound(String),

    #[error("Conversation '{0}' not found. Run `secgraph conversations list` to see all conversations.")]
    ConversationNotFound(String),

    // Store errors (E100-E199)
    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    // Generation errors (E200-E299)
    #[error("Answer generation failed: {0}")]
    GenerationFailed(String),

    #[error("Completion API error: {0}")]
    CompletionError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Network errors (E300-E399)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E500-E599)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E600-E699)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Serialization errors (E700-E799)
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::EntityNotFound(_) => "E001",
            Self::ConversationNotFound(_) => "E002",
            Self::StoreUnavailable(_) => "E100",
            Self::GenerationFailed(_) => "E200",
            Self::CompletionError(_) => "E201",
            Self::RateLimited(_) => "E202",
            Self::NetworkError(_) => "E300",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E500",
            Self::InvalidInput(_) => "E600",
            Self::SerializationError(_) => "E700",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Whether a retry of the same call can reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::NetworkError(_)
                | Self::RateLimited(_)
                | Self::DatabaseError(sqlx::Error::PoolTimedOut)
        )
    }
}
