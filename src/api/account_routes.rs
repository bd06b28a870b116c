//! Registration, wards and session endpoints

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::bearer_token;
use super::{ApiResult, AppState, CurrentActor};
use crate::identity::{CitizenRegistration, MemberRegistration, Registration};
use crate::models::{Role, User, Ward};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/accounts/citizens", post(register_citizen))
        .route("/api/accounts/members", post(register_member))
        .route("/api/accounts/me", get(me))
        .route("/api/auth/login", post(login))
        .route("/api/auth/session", delete(sign_out))
        .route("/api/wards", get(list_wards))
}

async fn register_citizen(
    State(portal): State<AppState>,
    Json(request): Json<CitizenRegistration>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    let registration = portal.registration.register_citizen(request).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// Staff and admin accounts are created by an admin.
async fn register_member(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<MemberRegistration>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    actor.require_role(&[Role::Admin])?;
    let registration = portal.registration.register_member(request).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// Email address or phone number, plus password
#[derive(Deserialize)]
struct LoginRequest {
    identifier: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    expires_at: DateTime<Utc>,
    user: User,
}

async fn login(
    State(portal): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (user, session) = portal
        .sessions
        .login(&request.identifier, &request.password)
        .await?;
    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    }))
}

async fn me(CurrentActor(actor): CurrentActor) -> Json<crate::identity::Actor> {
    Json(actor)
}

async fn sign_out(
    State(portal): State<AppState>,
    CurrentActor(_): CurrentActor,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
    {
        portal.sessions.revoke(token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_wards(State(portal): State<AppState>) -> ApiResult<Json<Vec<Ward>>> {
    Ok(Json(portal.registration.list_wards().await?))
}
