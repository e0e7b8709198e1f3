//! Routes chat frames between registered connections and hands them to the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::close_code;
use serde::Serialize;

use crate::connection_manager::{ConnectionHandle, ConnectionRegistry};
use crate::conversation::{ChatMessage, ConversationStore, StoreError};
use crate::metrics::{PersistenceMetrics, RelayMetrics};

use super::message::{close_reason, FrameKind};

/// What happened to a single inbound chat frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Frame could not be parsed; nothing was sent or stored
    Invalid,
    Relayed(RelayReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub message_id: String,
    pub delivered_to_recipient: bool,
    pub echoed_to_sender: bool,
    /// Identities whose connection was closed because a send to them failed
    pub evicted: Vec<String>,
    pub persistence: Persistence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Stored,
    ConversationNotFound,
    Failed,
}

/// Relay counters, exposed on `/stats`
#[derive(Debug, Default)]
struct RelayCounters {
    frames_relayed: AtomicU64,
    invalid_frames: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    recipients_offline: AtomicU64,
    persistence_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub frames_relayed: u64,
    pub invalid_frames: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    pub recipients_offline: u64,
    pub persistence_failures: u64,
}

pub struct MessageRelay {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn ConversationStore>,
    send_timeout: Duration,
    counters: RelayCounters,
}

impl MessageRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn ConversationStore>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            send_timeout,
            counters: RelayCounters::default(),
        }
    }

    /// Parse, route and persist one chat frame received on `origin`.
    #[tracing::instrument(
        name = "ws.message",
        skip(self, origin, payload),
        fields(
            connection_id = %origin.id,
            user_id = %origin.user_id,
            frame = kind.as_str()
        )
    )]
    pub async fn relay_frame(
        &self,
        origin: &ConnectionHandle,
        kind: FrameKind,
        payload: &[u8],
    ) -> RelayOutcome {
        let mut message = match parse_chat_message(payload) {
            Ok(message) => message,
            Err(reason) => {
                tracing::warn!(error = %reason, "Discarding malformed chat frame");
                RelayMetrics::record_invalid_frame();
                self.counters.invalid_frames.fetch_add(1, Ordering::Relaxed);
                return RelayOutcome::Invalid;
            }
        };

        if message.from != origin.user_id {
            if !message.from.is_empty() {
                tracing::warn!(
                    claimed_from = %message.from,
                    "Chat frame names another sender, using authenticated identity"
                );
            }
            message.from = origin.user_id.clone();
        }
        message.normalize();

        let encoded = match serde_json::to_string(&message) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode chat message");
                RelayMetrics::record_invalid_frame();
                self.counters.invalid_frames.fetch_add(1, Ordering::Relaxed);
                return RelayOutcome::Invalid;
            }
        };

        RelayMetrics::record_relayed();
        self.counters.frames_relayed.fetch_add(1, Ordering::Relaxed);

        let recipient = self.registry.get(&message.to);
        let sender = self.registry.get(&message.from);

        if recipient.is_none() {
            tracing::info!(
                to = %message.to,
                conversation_id = %message.conversation_id,
                "Recipient is not logged in"
            );
            RelayMetrics::record_recipient_offline();
            self.counters.recipients_offline.fetch_add(1, Ordering::Relaxed);
        }
        if sender.is_none() {
            tracing::info!(from = %message.from, "Sender is not logged in");
        }

        // A message to oneself is delivered once
        let sender = sender.filter(|s| recipient.as_ref().map_or(true, |r| r.id != s.id));

        let mut evicted = Vec::new();
        let (delivered_to_recipient, echoed_to_sender) = futures::join!(
            self.deliver(recipient.as_deref(), "recipient", kind, &encoded),
            self.deliver(sender.as_deref(), "sender", kind, &encoded),
        );
        for (handle, delivered) in [
            (recipient.as_deref(), delivered_to_recipient),
            (sender.as_deref(), echoed_to_sender),
        ] {
            if let (Some(handle), Some(false)) = (handle, delivered) {
                evicted.push(handle.user_id.clone());
            }
        }

        let persistence = self.persist(&message).await;

        RelayOutcome::Relayed(RelayReport {
            message_id: message.id,
            delivered_to_recipient: delivered_to_recipient.unwrap_or(false),
            echoed_to_sender: echoed_to_sender.unwrap_or(false),
            evicted,
            persistence,
        })
    }

    /// Send to one side. `None` if there was no live connection to send to.
    async fn deliver(
        &self,
        target: Option<&ConnectionHandle>,
        side: &'static str,
        kind: FrameKind,
        encoded: &str,
    ) -> Option<bool> {
        let target = target?;

        match target
            .send(kind.frame(encoded.to_owned()), self.send_timeout)
            .await
        {
            Ok(()) => {
                RelayMetrics::record_delivered(side);
                self.counters.deliveries.fetch_add(1, Ordering::Relaxed);
                Some(true)
            }
            Err(e) => {
                tracing::warn!(
                    target_user = %target.user_id,
                    target_connection = %target.id,
                    side,
                    error = %e,
                    "Delivery failed, closing peer connection"
                );
                RelayMetrics::record_delivery_failure();
                self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                self.registry
                    .evict(target, close_code::AWAY, close_reason::DELIVERY_FAILED);
                Some(false)
            }
        }
    }

    async fn persist(&self, message: &ChatMessage) -> Persistence {
        match self.store.append_message(message).await {
            Ok(()) => {
                PersistenceMetrics::record_ok();
                Persistence::Stored
            }
            Err(StoreError::NotFound(conversation_id)) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    "Conversation not found, message not stored"
                );
                PersistenceMetrics::record_not_found();
                self.counters.persistence_failures.fetch_add(1, Ordering::Relaxed);
                Persistence::ConversationNotFound
            }
            Err(e) => {
                tracing::error!(
                    conversation_id = %message.conversation_id,
                    message_id = %message.id,
                    error = %e,
                    "Failed to store message"
                );
                PersistenceMetrics::record_error();
                self.counters.persistence_failures.fetch_add(1, Ordering::Relaxed);
                Persistence::Failed
            }
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            frames_relayed: self.counters.frames_relayed.load(Ordering::Relaxed),
            invalid_frames: self.counters.invalid_frames.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            recipients_offline: self.counters.recipients_offline.load(Ordering::Relaxed),
            persistence_failures: self.counters.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

fn parse_chat_message(payload: &[u8]) -> Result<ChatMessage, String> {
    let message: ChatMessage = serde_json::from_slice(payload).map_err(|e| e.to_string())?;

    if message.to.trim().is_empty() {
        return Err("missing recipient".to_string());
    }
    if message.conversation_id.trim().is_empty() {
        return Err("missing conversationId".to_string());
    }

    Ok(message)
}
