//! In-memory conversation store using DashMap.
//!
//! Conversations live only for the lifetime of the process.

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{ConversationStore, StoreError, StoreStats};
use super::types::{ChatMessage, Conversation};

/// In-memory conversation store.
///
/// Each conversation is guarded by its DashMap shard, so appends to
/// different conversations proceed concurrently.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: DashMap<String, Conversation>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut conversation = self
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| StoreError::NotFound(message.conversation_id.clone()))?;

        conversation.messages.push(message.clone());

        tracing::trace!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            total = conversation.messages.len(),
            "Message appended to conversation"
        );

        Ok(())
    }

    async fn create_conversation(
        &self,
        participants: Vec<String>,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(participants);
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());

        tracing::debug!(
            conversation_id = %conversation.id,
            participants = ?conversation.participants,
            "Conversation created"
        );

        Ok(conversation)
    }

    async fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.get(id).map(|c| c.clone()))
    }

    async fn user_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|entry| entry.value().has_participant(user_id))
            .map(|entry| entry.value().clone())
            .collect();

        conversations.sort_by_key(|c| c.created_at);
        Ok(conversations)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let messages = self
            .conversations
            .iter()
            .map(|entry| entry.value().messages.len() as u64)
            .sum();

        Ok(StoreStats {
            backend_type: self.backend_name().to_string(),
            conversations: self.conversations.len() as u64,
            messages,
        })
    }
}
