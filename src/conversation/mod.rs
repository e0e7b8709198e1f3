//! Conversation persistence.
//!
//! The relay appends every delivered message here; the HTTP API lists and
//! creates conversations through the same store.

mod factory;
mod memory_store;
mod postgres_store;
mod store;
mod types;

pub use factory::create_conversation_store;
pub use memory_store::MemoryConversationStore;
pub use postgres_store::PostgresConversationStore;
pub use store::{ConversationStore, StoreError, StoreStats};
pub use types::{participant_list, ChatMessage, Conversation};
