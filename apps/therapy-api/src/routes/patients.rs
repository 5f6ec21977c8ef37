use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use therapy_core::inputs::{CreatePatientInput, ListQuery, UpdatePatientInput};
use therapy_core::models::Patient;
use uuid::Uuid;

use crate::auth::Authenticated;
use crate::error::{ApiResult, JsonBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/patients", get(list).post(create))
        .route("/api/patients/:id", get(fetch).put(update).delete(remove))
}

async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Patient>>> {
    Ok(Json(state.workflow.list_patients(&principal, &query).await?))
}

async fn fetch(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.workflow.get_patient(&principal, id).await?))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<CreatePatientInput>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let patient = state.workflow.create_patient(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<UpdatePatientInput>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.workflow.update_patient(&principal, id, input).await?))
}

async fn remove(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.workflow.delete_patient(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
