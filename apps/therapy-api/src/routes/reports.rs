use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use therapy_core::inputs::{
    CreateReportInput, FeedbackInput, ListQuery, TransitionInput, UpdateReportInput,
};
use therapy_core::models::ProgressReportView;
use therapy_core::{ApprovalStatus, Principal};
use uuid::Uuid;

use crate::auth::Authenticated;
use crate::error::{ApiResult, JsonBody, OptionalJsonBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/progress-reports", get(list).post(create))
        .route(
            "/api/progress-reports/:id",
            get(fetch).put(update).delete(remove),
        )
        .route("/api/progress-reports/:id/submit", post(submit))
        .route("/api/progress-reports/:id/approve", post(approve))
        .route("/api/progress-reports/:id/reject", post(reject))
        .route("/api/progress-reports/:id/status", put(change_status))
}

async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ProgressReportView>>> {
    Ok(Json(state.workflow.list_reports(&principal, &query).await?))
}

async fn fetch(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProgressReportView>> {
    Ok(Json(state.workflow.get_report(&principal, id).await?))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<CreateReportInput>,
) -> ApiResult<(StatusCode, Json<ProgressReportView>)> {
    let report = state.workflow.create_report(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<UpdateReportInput>,
) -> ApiResult<Json<ProgressReportView>> {
    Ok(Json(state.workflow.update_report(&principal, id, input).await?))
}

async fn remove(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.workflow.delete_report(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProgressReportView>> {
    let report = state
        .workflow
        .transition_report(&principal, id, ApprovalStatus::PendingApproval, None)
        .await?;
    Ok(Json(report))
}

async fn decide(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
    requested: ApprovalStatus,
    body: Option<FeedbackInput>,
) -> ApiResult<Json<ProgressReportView>> {
    let input = body.unwrap_or_default();
    input.check()?;
    let report = state
        .workflow
        .transition_report(principal, id, requested, input.feedback.as_deref())
        .await?;
    Ok(Json(report))
}

async fn approve(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    OptionalJsonBody(body): OptionalJsonBody<FeedbackInput>,
) -> ApiResult<Json<ProgressReportView>> {
    decide(&state, &principal, id, ApprovalStatus::Approved, body).await
}

async fn reject(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    OptionalJsonBody(body): OptionalJsonBody<FeedbackInput>,
) -> ApiResult<Json<ProgressReportView>> {
    decide(&state, &principal, id, ApprovalStatus::Rejected, body).await
}

async fn change_status(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<TransitionInput>,
) -> ApiResult<Json<ProgressReportView>> {
    input.check()?;
    let report = state
        .workflow
        .transition_report(&principal, id, input.status, input.feedback.as_deref())
        .await?;
    Ok(Json(report))
}
