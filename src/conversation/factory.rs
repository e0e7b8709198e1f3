//! Conversation store factory

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::postgres::PostgresPool;

use super::memory_store::MemoryConversationStore;
use super::postgres_store::PostgresConversationStore;
use super::store::ConversationStore;

/// Create a conversation store based on configuration.
///
/// - `"postgres"`: a `PostgresConversationStore` if a pool is provided
/// - anything else: a `MemoryConversationStore`
pub fn create_conversation_store(
    settings: &DatabaseConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn ConversationStore> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL conversation store");
                Arc::new(PostgresConversationStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryConversationStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory conversation store");
            Arc::new(MemoryConversationStore::new())
        }
    }
}
