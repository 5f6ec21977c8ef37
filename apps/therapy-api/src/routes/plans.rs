use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use therapy_core::inputs::{
    CreatePlanInput, FeedbackInput, ListQuery, TransitionInput, UpdatePlanInput,
};
use therapy_core::models::TherapyPlanView;
use therapy_core::{ApprovalStatus, Principal};
use uuid::Uuid;

use crate::auth::Authenticated;
use crate::error::{ApiResult, JsonBody, OptionalJsonBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/therapy-plans", get(list).post(create))
        .route(
            "/api/therapy-plans/:id",
            get(fetch).put(update).delete(remove),
        )
        .route("/api/therapy-plans/:id/submit", post(submit))
        .route("/api/therapy-plans/:id/approve", post(approve))
        .route("/api/therapy-plans/:id/reject", post(reject))
        .route("/api/therapy-plans/:id/status", put(change_status))
}

async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<TherapyPlanView>>> {
    Ok(Json(state.workflow.list_plans(&principal, &query).await?))
}

async fn fetch(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TherapyPlanView>> {
    Ok(Json(state.workflow.get_plan(&principal, id).await?))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<CreatePlanInput>,
) -> ApiResult<(StatusCode, Json<TherapyPlanView>)> {
    let plan = state.workflow.create_plan(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<UpdatePlanInput>,
) -> ApiResult<Json<TherapyPlanView>> {
    Ok(Json(state.workflow.update_plan(&principal, id, input).await?))
}

async fn remove(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.workflow.delete_plan(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TherapyPlanView>> {
    let plan = state
        .workflow
        .transition_plan(&principal, id, ApprovalStatus::PendingApproval, None)
        .await?;
    Ok(Json(plan))
}

async fn decide(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
    requested: ApprovalStatus,
    body: Option<FeedbackInput>,
) -> ApiResult<Json<TherapyPlanView>> {
    let input = body.unwrap_or_default();
    input.check()?;
    let plan = state
        .workflow
        .transition_plan(principal, id, requested, input.feedback.as_deref())
        .await?;
    Ok(Json(plan))
}

async fn approve(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    OptionalJsonBody(body): OptionalJsonBody<FeedbackInput>,
) -> ApiResult<Json<TherapyPlanView>> {
    decide(&state, &principal, id, ApprovalStatus::Approved, body).await
}

async fn reject(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    OptionalJsonBody(body): OptionalJsonBody<FeedbackInput>,
) -> ApiResult<Json<TherapyPlanView>> {
    decide(&state, &principal, id, ApprovalStatus::Rejected, body).await
}

async fn change_status(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<TransitionInput>,
) -> ApiResult<Json<TherapyPlanView>> {
    input.check()?;
    let plan = state
        .workflow
        .transition_plan(&principal, id, input.status, input.feedback.as_deref())
        .await?;
    Ok(Json(plan))
}
