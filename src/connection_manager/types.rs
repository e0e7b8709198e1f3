//! Connection handle and related types

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Why an outbound frame could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection is closed")]
    Closed,
    #[error("send deadline exceeded")]
    Timeout,
}

/// Handle for a single live WebSocket connection.
///
/// The socket itself is owned by the connection's writer task; the handle
/// feeds it through a bounded channel, which also serializes frames coming
/// from the read loop, the heartbeat monitor and other connections' relays.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
    sender: mpsc::Sender<Message>,
    closing: AtomicBool,
    cancel: CancellationToken,
    pub connected_at: DateTime<Utc>,
    opened: Instant,
    /// Milliseconds after `opened` at which the last probe acknowledgment arrived
    last_ack_ms: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(user_id: String, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            sender,
            closing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            connected_at: Utc::now(),
            opened: Instant::now(),
            last_ack_ms: AtomicU64::new(0),
        }
    }

    /// Queue a frame for this connection, waiting at most `deadline` for room.
    pub async fn send(&self, message: Message, deadline: Duration) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }

        match tokio::time::timeout(deadline, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Timeout),
        }
    }

    /// Close the connection: queue a close frame (best-effort) and cancel the
    /// connection's tasks. Returns false if the handle was already closed.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_owned().into(),
        }));
        if self.sender.try_send(frame).is_err() {
            tracing::debug!(
                connection_id = %self.id,
                user_id = %self.user_id,
                "Close frame not queued, outbound buffer full or closed"
            );
        }

        self.cancel.cancel();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Resolves once the connection has been closed from any side.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Token shared with the writer task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record a liveness-probe acknowledgment (pong), extending the read deadline.
    pub fn acknowledge_probe(&self) {
        let elapsed = self.opened.elapsed().as_millis() as u64;
        self.last_ack_ms.fetch_max(elapsed, Ordering::AcqRel);
    }

    /// When the last acknowledgment was seen (connection start if none yet).
    pub fn last_acknowledged(&self) -> Instant {
        self.opened + Duration::from_millis(self.last_ack_ms.load(Ordering::Acquire))
    }

    /// Instant after which the read loop treats the peer as dead.
    pub fn read_deadline(&self, pong_timeout: Duration) -> Instant {
        self.last_acknowledged() + pong_timeout
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
