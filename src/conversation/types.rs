//! Chat message and conversation models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A single chat message, as carried on the wire and stored in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Assigned by the relay when absent or null
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    pub conversation_id: String,
    pub to: String,
    #[serde(default)]
    pub from: String,
    pub content: String,
    /// Assigned by the relay when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatMessage {
    /// Fill in a server-side id and timestamp where the client left them out.
    pub fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }

    pub fn is_normalized(&self) -> bool {
        !self.id.is_empty() && self.timestamp.is_some()
    }
}

/// A conversation between participants with its message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(participants: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            participants,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Build the participant list for a new conversation: the requested users
/// followed by the initiator, without duplicates or blanks.
pub fn participant_list(initiator: &str, requested: Vec<String>) -> Vec<String> {
    let mut participants: Vec<String> = Vec::with_capacity(requested.len() + 1);
    for user in requested.into_iter().chain(std::iter::once(initiator.to_string())) {
        let user = user.trim().to_string();
        if !user.is_empty() && !participants.contains(&user) {
            participants.push(user);
        }
    }
    participants
}
