//! Token authentication
//!
//! Accepts `Authorization: Token <t>` or `Authorization: Bearer <t>` and
//! resolves it through the portal's [`SessionResolver`].

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;
use crate::error::AuthorizationError;
use crate::identity::{Actor, SessionResolver};

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

/// Token part of an `Authorization` header value.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError(AuthorizationError::Unauthenticated.into()))?;

        let actor = state.sessions.resolve(token).await?;
        Ok(CurrentActor(actor))
    }
}
