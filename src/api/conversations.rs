//! Conversation endpoints for authenticated users.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::conversation::{participant_list, Conversation};
use crate::error::{AppError, Result};
use crate::server::{AppState, AuthUser};

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub participants: Vec<String>,
}

/// GET /api/conversations - conversations of the caller
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Conversation>>> {
    let conversations = state.store.user_conversations(&user_id).await?;
    Ok(Json(conversations))
}

/// POST /api/create-conversation
#[tracing::instrument(name = "api.create_conversation", skip(state, request))]
pub async fn create_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>> {
    let participants = participant_list(&user_id, request.participants);
    let conversation = state.store.create_conversation(participants).await?;
    tracing::info!(conversation_id = %conversation.id, "Conversation created");

    Ok(Json(conversation))
}

/// GET /api/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Conversation>> {
    let conversation = state
        .store
        .conversation(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conversation {}", id)))?;

    if !conversation.has_participant(&user_id) {
        return Err(AppError::Forbidden(
            "Not a participant of this conversation".to_string(),
        ));
    }

    Ok(Json(conversation))
}
