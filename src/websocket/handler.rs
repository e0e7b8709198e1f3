use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};
use futures::StreamExt;

use crate::server::AppState;

use super::session::{run_session, SessionContext};

/// WebSocket upgrade handler.
///
/// The upgrade is unconditional; the first frame on the socket authenticates it.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let ctx = state.session_context();

    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: SessionContext) {
    let (sink, stream) = socket.split();
    run_session(sink, stream, ctx).await;
}
