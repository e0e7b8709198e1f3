use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::conversations::{create_conversation, get_conversation, list_conversations};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Conversations (bearer token)
        .nest(
            "/api",
            Router::new()
                .route("/conversations", get(list_conversations))
                .route("/conversations/{id}", get(get_conversation))
                .route("/create-conversation", post(create_conversation)),
        )
}
