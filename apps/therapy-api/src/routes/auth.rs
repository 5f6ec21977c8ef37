use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use therapy_core::inputs::{LoginInput, RegisterInput, UpdateProfileInput};
use therapy_core::models::User;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, Authenticated};
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::AppState;

#[derive(Serialize)]
struct Session {
    token: String,
    user: User,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/profile", axum::routing::get(profile).put(update_profile))
}

async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    input.check()?;
    let password_hash = hash_password(&input.password)?;
    let user = state.workflow.register_user(&input, &password_hash).await?;
    let token = state
        .tokens
        .issue(&user)
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok((StatusCode::CREATED, Json(Session { token, user })))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginInput>,
) -> ApiResult<Json<Session>> {
    let credentials = state
        .workflow
        .credentials(&input.email)
        .await?
        .filter(|c| verify_password(&input.password, &c.password_hash))
        .ok_or_else(|| {
            warn!("Tentativa de login com credenciais inválidas");
            ApiError::InvalidCredentials
        })?;

    let token = state
        .tokens
        .issue(&credentials.user)
        .map_err(|e| ApiError::Internal(e.into()))?;
    info!(user = %credentials.user.id, "Login realizado");
    Ok(Json(Session {
        token,
        user: credentials.user,
    }))
}

async fn profile(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<Json<User>> {
    Ok(Json(state.workflow.profile(&principal).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<UpdateProfileInput>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.workflow.update_profile(&principal, input).await?))
}
