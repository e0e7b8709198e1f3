//! Lifecycle of one connection: Authenticating -> Active -> Closing -> Closed.
//!
//! Generic over the socket halves so sessions can be driven by in-memory
//! channels as well as by an upgraded axum `WebSocket`.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{close_code, Message};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenVerifier;
use crate::config::RelayConfig;
use crate::connection_manager::{ConnectionHandle, ConnectionRegistry};
use crate::metrics::{AdmissionMetrics, HeartbeatMetrics};
use crate::tasks::HeartbeatMonitor;

use super::admission::admit;
use super::message::{close_frame, FrameKind};
use super::relay::MessageRelay;

/// Everything a session needs from the application
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<ConnectionRegistry>,
    pub relay: Arc<MessageRelay>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub config: RelayConfig,
}

/// Why the read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// Handle closed elsewhere (superseded, failed delivery, heartbeat, shutdown)
    Closed,
    PeerClosed,
    PeerGone,
    ReadError,
    ReadDeadline,
}

impl CloseCause {
    fn as_str(&self) -> &'static str {
        match self {
            CloseCause::Closed => "closed",
            CloseCause::PeerClosed => "peer_closed",
            CloseCause::PeerGone => "peer_gone",
            CloseCause::ReadError => "read_error",
            CloseCause::ReadDeadline => "read_deadline",
        }
    }
}

/// Drive a connection from its first frame to teardown.
pub async fn run_session<S, R, E>(mut sink: S, mut stream: R, ctx: SessionContext)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    let user_id = match admit(&mut stream, ctx.verifier.as_ref(), ctx.config.auth_timeout).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected");
            AdmissionMetrics::record_outcome(e.outcome());
            if let Some(reason) = e.close_reason() {
                let _ = sink.send(close_frame(close_code::POLICY, reason)).await;
            }
            let _ = sink.close().await;
            return;
        }
    };
    AdmissionMetrics::record_outcome("accepted");

    let (tx, rx) = mpsc::channel(ctx.config.channel_capacity);
    let handle = Arc::new(ConnectionHandle::new(user_id, tx));
    let connection_id = handle.id;

    let mut writer = tokio::spawn(write_loop(sink, rx, handle.cancellation_token()));
    ctx.registry.put(handle.clone());
    let heartbeat = tokio::spawn(HeartbeatMonitor::new(handle.clone(), &ctx.config).run());

    tracing::info!(
        connection_id = %connection_id,
        user_id = %handle.user_id,
        "WebSocket connection established"
    );

    let cause = read_loop(&mut stream, &handle, &ctx).await;

    // Closing
    handle.close(close_code::NORMAL, "");
    ctx.registry.delete_if_owned(&handle.user_id, connection_id);

    if let Err(e) = heartbeat.await {
        tracing::debug!(connection_id = %connection_id, error = %e, "Heartbeat task ended abnormally");
    }
    // A peer that stopped reading can hold the writer inside a send
    match tokio::time::timeout(ctx.config.send_timeout, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "Writer task ended abnormally")
        }
        Err(_) => {
            writer.abort();
            tracing::debug!(connection_id = %connection_id, "Writer did not finish in time, aborted");
        }
    }

    let duration = (chrono::Utc::now() - handle.connected_at)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    AdmissionMetrics::record_connection_duration(duration);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %handle.user_id,
        cause = cause.as_str(),
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

#[tracing::instrument(
    name = "ws.connection",
    skip(stream, handle, ctx),
    fields(
        connection_id = %handle.id,
        user_id = %handle.user_id,
        otel.kind = "server"
    )
)]
async fn read_loop<R, E>(stream: &mut R, handle: &ConnectionHandle, ctx: &SessionContext) -> CloseCause
where
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    loop {
        let deadline = handle.read_deadline(ctx.config.pong_timeout);

        let next = tokio::select! {
            biased;
            _ = handle.closed() => return CloseCause::Closed,
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                tracing::warn!("No heartbeat acknowledgment before read deadline");
                HeartbeatMetrics::record_timeout();
                return CloseCause::ReadDeadline;
            }
            Ok(None) => return CloseCause::PeerGone,
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "WebSocket receive error");
                return CloseCause::ReadError;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                ctx.relay
                    .relay_frame(handle, FrameKind::Text, text.as_str().as_bytes())
                    .await;
            }
            Message::Binary(data) => {
                ctx.relay.relay_frame(handle, FrameKind::Binary, &data).await;
            }
            Message::Pong(_) => handle.acknowledge_probe(),
            // Answered by the transport
            Message::Ping(_) => {}
            Message::Close(frame) => {
                tracing::debug!(code = ?frame.as_ref().map(|f| f.code), "Received close frame");
                return CloseCause::PeerClosed;
            }
        }
    }
}

/// Owns the socket's write half; drains queued frames until the handle closes.
async fn write_loop<S>(mut sink: S, mut rx: mpsc::Receiver<Message>, closed: CancellationToken)
where
    S: Sink<Message> + Unpin,
    S::Error: Display + Send,
{
    loop {
        tokio::select! {
            biased;
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let is_close = matches!(frame, Message::Close(_));
                if let Err(e) = sink.send(frame).await {
                    tracing::debug!(error = %e, "WebSocket send failed");
                    closed.cancel();
                    break;
                }
                if is_close {
                    break;
                }
            }
            _ = closed.cancelled() => {
                // Flush what was queued before the close, typically the close frame itself
                while let Ok(frame) = rx.try_recv() {
                    let is_close = matches!(frame, Message::Close(_));
                    if sink.send(frame).await.is_err() || is_close {
                        break;
                    }
                }
                break;
            }
        }
    }

    rx.close();
    let _ = sink.close().await;
}
