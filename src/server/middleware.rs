use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use super::AppState;
use crate::error::AppError;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Identity of the caller of a bearer-protected endpoint
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            tracing::warn!("Missing bearer token");
            AppError::Auth("Missing authorization token".to_string())
        })?;

        let user_id = state.verifier.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "Bearer token rejected");
            e
        })?;

        Ok(AuthUser(user_id))
    }
}
