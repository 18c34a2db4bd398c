use axum::{extract::FromRequestParts, http::request::Parts};
use winechat_translation::UserId;

use crate::{error::ApiError, state::AppState};

/// The caller identified by a `Bearer` access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Expected a Bearer token".to_string()))?;

        let claims = state.auth.verify_access_token(token.trim())?;
        Ok(AuthUser {
            user_id: UserId::new(claims.sub),
        })
    }
}
