//! Tradução dos erros do fluxo clínico para respostas HTTP

use axum::{
    async_trait,
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection},
        FromRequest,
    },
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use therapy_core::{DbError, WorkflowError};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Corpo da requisição inválido: {0}")]
    BadRequest(String),

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<DbError> for ApiError {
    fn from(error: DbError) -> Self {
        ApiError::Workflow(error.into())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

fn body(status: StatusCode, kind: &str, message: String) -> Response {
    (status, Json(json!({ "error": kind, "message": message }))).into_response()
}

fn internal(detail: &dyn std::fmt::Display) -> Response {
    error!(error = %detail, "Falha interna ao processar requisição");
    body(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "Erro interno do servidor".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let workflow = match self {
            ApiError::Workflow(e) => e,
            ApiError::BadRequest(_) => return body(StatusCode::BAD_REQUEST, "bad_request", message),
            ApiError::InvalidCredentials => {
                return body(StatusCode::UNAUTHORIZED, "unauthenticated", message)
            }
            ApiError::Internal(e) => return internal(&e),
        };

        match workflow {
            WorkflowError::Unauthenticated => {
                body(StatusCode::UNAUTHORIZED, "unauthenticated", message)
            }
            WorkflowError::Forbidden(_) => body(StatusCode::FORBIDDEN, "forbidden", message),
            WorkflowError::NotFound(_) => body(StatusCode::NOT_FOUND, "not_found", message),
            WorkflowError::ValidationFailed(fields) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "validation_failed",
                    "message": message,
                    "fields": fields,
                })),
            )
                .into_response(),
            WorkflowError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "invalid_transition",
                    "message": message,
                    "from": from,
                    "to": to,
                })),
            )
                .into_response(),
            WorkflowError::NotEditable { .. } => body(StatusCode::CONFLICT, "not_editable", message),
            WorkflowError::Conflict => body(StatusCode::CONFLICT, "conflict", message),
            WorkflowError::Store(e) => internal(&e),
        }
    }
}

/// Extrator JSON cujas falhas de leitura respondem 400
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for JsonBody<T>
where
    T: DeserializeOwned,
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(Self(value))
    }
}

/// Corpo JSON opcional: vazio vira `None`, conteúdo inválido responde 400
pub struct OptionalJsonBody<T>(pub Option<T>);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for OptionalJsonBody<T>
where
    T: DeserializeOwned,
    Bytes: FromRequest<S, B, Rejection = BytesRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }
        serde_json::from_slice(&bytes)
            .map(|value| Self(Some(value)))
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use therapy_core::{ApprovalStatus, EntityClass, FieldError};

    fn status_of(error: impl Into<ApiError>) -> StatusCode {
        error.into().into_response().status()
    }

    #[test]
    fn workflow_errors_map_to_status_codes() {
        assert_eq!(status_of(WorkflowError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(WorkflowError::Forbidden("x".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(WorkflowError::NotFound(EntityClass::Patient)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(WorkflowError::ValidationFailed(vec![FieldError::new("goals", "vazio")])),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(WorkflowError::InvalidTransition {
                from: ApprovalStatus::Approved,
                to: ApprovalStatus::Approved,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(WorkflowError::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_of(WorkflowError::NotEditable {
                status: ApprovalStatus::Approved
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn store_failures_become_generic_500() {
        assert_eq!(
            status_of(DbError::QueryError("no such column: secret".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(ApiError::InvalidCredentials), StatusCode::UNAUTHORIZED);
    }
}
