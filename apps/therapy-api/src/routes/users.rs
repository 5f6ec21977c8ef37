use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use therapy_core::models::User;

use crate::auth::Authenticated;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct UsersQuery {
    role: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/supervisors", get(list_supervisors))
}

async fn list_users(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Query(query): Query<UsersQuery>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.workflow.list_users(query.role.as_deref()).await?))
}

async fn list_supervisors(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.workflow.list_supervisors().await?))
}
