use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use therapy_core::inputs::{CreateRatingInput, ListQuery, UpdateRatingInput};
use therapy_core::models::ClinicalRatingView;
use uuid::Uuid;

use crate::auth::Authenticated;
use crate::error::{ApiResult, JsonBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ratings", get(list).post(create))
        .route("/api/ratings/:id", get(fetch).put(update).delete(remove))
}

async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ClinicalRatingView>>> {
    Ok(Json(state.workflow.list_ratings(&principal, &query).await?))
}

async fn fetch(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ClinicalRatingView>> {
    Ok(Json(state.workflow.get_rating(&principal, id).await?))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<CreateRatingInput>,
) -> ApiResult<(StatusCode, Json<ClinicalRatingView>)> {
    let rating = state.workflow.create_rating(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<UpdateRatingInput>,
) -> ApiResult<Json<ClinicalRatingView>> {
    Ok(Json(state.workflow.update_rating(&principal, id, input).await?))
}

async fn remove(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.workflow.delete_rating(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
