use axum::extract::ws::{CloseFrame, Message};
use serde::{Deserialize, Serialize};

/// First frame a client sends after the upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthMessage {
    pub token: String,
}

/// Close frame reasons sent to peers
pub mod close_reason {
    pub const INVALID_AUTH_MESSAGE: &str = "Invalid authentication message";
    pub const INVALID_TOKEN: &str = "Invalid token";
    pub const AUTH_TIMEOUT: &str = "Authentication timeout";
    pub const SUPERSEDED: &str = "Superseded by new connection";
    pub const SHUTTING_DOWN: &str = "Server shutting down";
    pub const HEARTBEAT_FAILED: &str = "Heartbeat failed";
    pub const DELIVERY_FAILED: &str = "Delivery failed";
}

/// Transport framing of a chat payload, kept from inbound to outbound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Text => "text",
            FrameKind::Binary => "binary",
        }
    }

    /// Wrap an encoded payload in a frame of this kind
    pub fn frame(self, payload: String) -> Message {
        match self {
            FrameKind::Text => Message::Text(payload.into()),
            FrameKind::Binary => Message::Binary(payload.into_bytes().into()),
        }
    }
}

pub fn close_frame(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_owned().into(),
    }))
}
