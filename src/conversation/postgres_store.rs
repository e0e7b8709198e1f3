//! PostgreSQL-based conversation store.
//!
//! Table structure:
//! - `conversations` - one row per conversation
//! - `conversation_participants` - participant membership, ordered by `position`
//! - `messages` - appended messages, ordered by `seq`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::store::{ConversationStore, StoreError, StoreStats};
use super::types::{ChatMessage, Conversation};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversation_participants (
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        username TEXT NOT NULL,
        position INT NOT NULL,
        PRIMARY KEY (conversation_id, username)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_conversation_participants_username
        ON conversation_participants (username)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        seq BIGSERIAL PRIMARY KEY,
        id TEXT NOT NULL,
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        to_user TEXT NOT NULL,
        from_user TEXT NOT NULL,
        content TEXT NOT NULL,
        sent_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages (conversation_id, seq)
    "#,
];

type MessageRow = (String, String, String, String, String, DateTime<Utc>);

/// PostgreSQL-based conversation store.
pub struct PostgresConversationStore {
    pool: PgPool,
}

impl PostgresConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: String, created_at: DateTime<Utc>) -> Result<Conversation, StoreError> {
        let participants: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT username FROM conversation_participants
            WHERE conversation_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, to_user, from_user, content, sent_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|(id, conversation_id, to, from, content, sent_at)| ChatMessage {
                id,
                conversation_id,
                to,
                from,
                content,
                timestamp: Some(sent_at),
            })
            .collect();

        Ok(Conversation {
            id,
            participants: participants.into_iter().map(|(u,)| u).collect(),
            messages,
            created_at,
        })
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.iter().copied() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Conversation schema ready");
        Ok(())
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let sent_at = message.timestamp.unwrap_or_else(Utc::now);

        // Insert only when the conversation exists; zero rows means NotFound
        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, to_user, from_user, content, sent_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (SELECT 1 FROM conversations WHERE id = $2)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.to)
        .bind(&message.from)
        .bind(&message.content)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(message.conversation_id.clone()));
        }

        tracing::trace!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "Message appended to PostgreSQL"
        );

        Ok(())
    }

    async fn create_conversation(
        &self,
        participants: Vec<String>,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(participants);

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO conversations (id, created_at) VALUES ($1, $2)")
            .bind(&conversation.id)
            .bind(conversation.created_at)
            .execute(&mut *tx)
            .await?;

        for (position, username) in conversation.participants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO conversation_participants (conversation_id, username, position)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&conversation.id)
            .bind(username)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            conversation_id = %conversation.id,
            participants = ?conversation.participants,
            "Conversation created in PostgreSQL"
        );

        Ok(conversation)
    }

    async fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, created_at FROM conversations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((id, created_at)) => Ok(Some(self.load(id, created_at).await?)),
            None => Ok(None),
        }
    }

    async fn user_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT c.id, c.created_at
            FROM conversations c
            JOIN conversation_participants p ON p.conversation_id = c.id
            WHERE p.username = $1
            ORDER BY c.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for (id, created_at) in rows {
            conversations.push(self.load(id, created_at).await?);
        }
        Ok(conversations)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let (conversations,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await?;
        let (messages,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            backend_type: self.backend_name().to_string(),
            conversations: conversations.max(0) as u64,
            messages: messages.max(0) as u64,
        })
    }
}
