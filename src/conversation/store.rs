//! Backend trait for conversation storage.
//!
//! The relay hands every normalized message to a `ConversationStore`; the
//! HTTP API reads and creates conversations through the same trait, so
//! memory and PostgreSQL implementations are interchangeable.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::types::{ChatMessage, Conversation};

/// Errors that can occur during conversation store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No conversation exists with the given identifier
    #[error("No conversation found with id {0}")]
    NotFound(String),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),
}

/// Statistics about the conversation store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend_type: String,
    pub conversations: u64,
    pub messages: u64,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend identifier used in logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Prepare the backend (create tables etc.). Called once at startup.
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Append a delivered message to its conversation.
    ///
    /// Returns `StoreError::NotFound` when the conversation does not exist.
    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// Create a conversation with the given participants (already de-duplicated).
    async fn create_conversation(
        &self,
        participants: Vec<String>,
    ) -> Result<Conversation, StoreError>;

    /// Fetch a single conversation with its messages.
    async fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError>;

    /// All conversations the user participates in, oldest first.
    async fn user_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
