//! Admission gate: the first frame on a new connection must authenticate it.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::auth::TokenVerifier;

use super::message::{close_reason, AuthMessage};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("connection closed before authenticating")]
    Disconnected,

    #[error("invalid authentication message: {0}")]
    InvalidMessage(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("authentication timed out")]
    Timeout,
}

impl AdmissionError {
    /// Reason carried by the rejecting close frame. `None` when the peer is already gone.
    pub fn close_reason(&self) -> Option<&'static str> {
        match self {
            AdmissionError::Disconnected => None,
            AdmissionError::InvalidMessage(_) => Some(close_reason::INVALID_AUTH_MESSAGE),
            AdmissionError::InvalidToken(_) => Some(close_reason::INVALID_TOKEN),
            AdmissionError::Timeout => Some(close_reason::AUTH_TIMEOUT),
        }
    }

    /// Label for the admissions metric
    pub fn outcome(&self) -> &'static str {
        match self {
            AdmissionError::Disconnected => "disconnected",
            AdmissionError::InvalidMessage(_) => "invalid_message",
            AdmissionError::InvalidToken(_) => "invalid_token",
            AdmissionError::Timeout => "timeout",
        }
    }
}

/// Wait for the authentication frame and verify its token.
///
/// `wait` bounds how long the peer has to authenticate; `None` waits forever.
pub async fn admit<R, E>(
    stream: &mut R,
    verifier: &dyn TokenVerifier,
    wait: Option<Duration>,
) -> Result<String, AdmissionError>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let payload = match wait {
        Some(limit) => tokio::time::timeout(limit, next_payload(stream))
            .await
            .map_err(|_| AdmissionError::Timeout)??,
        None => next_payload(stream).await?,
    };

    let auth: AuthMessage = serde_json::from_slice(&payload)
        .map_err(|e| AdmissionError::InvalidMessage(e.to_string()))?;

    verifier
        .verify(&auth.token)
        .map_err(|e| AdmissionError::InvalidToken(e.to_string()))
}

async fn next_payload<R, E>(stream: &mut R) -> Result<Vec<u8>, AdmissionError>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
            Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Err(AdmissionError::Disconnected),
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Receive error before authentication");
                return Err(AdmissionError::Disconnected);
            }
        }
    }
}
