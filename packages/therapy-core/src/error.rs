//! Definições de erro para o núcleo do fluxo clínico
//!
//! Este módulo define os erros de persistência (`DbError`) e a taxonomia de
//! erros do fluxo de trabalho (`WorkflowError`) que a camada HTTP traduz em
//! códigos de status.

use serde::Serialize;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::access::EntityClass;
use crate::approval::ApprovalStatus;

/// Erros específicos para operações de banco de dados
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Erro de conexão com banco de dados: {0}")]
    ConnectionError(String),

    #[error("Erro de consulta: {0}")]
    QueryError(String),

    #[error("Entidade não encontrada: {0}")]
    NotFound(String),

    #[error("Violação de restrição: {0}")]
    ConstraintViolation(String),

    #[error("Erro de criptografia: {0}")]
    CryptoError(String),

    #[error("Erro interno: {0}")]
    InternalError(String),
}

/// Conversão de erros específicos do SQLx para nossos tipos de erro
impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DbError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => {
                if let Some(code) = dbe.code() {
                    // 2067 = SQLITE_CONSTRAINT_UNIQUE, 787 = SQLITE_CONSTRAINT_FOREIGNKEY
                    if matches!(code.as_ref(), "23000" | "2067" | "787" | "1555") {
                        return DbError::ConstraintViolation(dbe.message().to_string());
                    }
                }
                DbError::QueryError(dbe.message().to_string())
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::QueryError(format!("Coluna não encontrada: {}", col))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::QueryError(format!("Tipo não encontrado: {}", type_name))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::QueryError(format!("Erro ao decodificar coluna {}: {}", index, source))
            }
            sqlx::Error::Io(io_err) => DbError::ConnectionError(io_err.to_string()),
            sqlx::Error::Configuration(conf_err) => DbError::ConnectionError(conf_err.to_string()),
            sqlx::Error::PoolClosed => {
                DbError::ConnectionError("Pool de conexões fechado".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                DbError::ConnectionError("Timeout no pool de conexões".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                DbError::InternalError("Worker do banco de dados falhou".to_string())
            }
            _ => DbError::InternalError(format!("Erro inesperado: {:?}", error)),
        }
    }
}

/// Erro de validação associado a um campo específico da requisição
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Caminho do campo como o cliente o envia (ex.: `sessionDetails.duration`)
    pub field: String,
    /// Mensagem legível
    pub message: String,
}

impl FieldError {
    /// `field` pode vir com os nomes Rust (`end_date`); é gravado em camelCase
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: camel_case_path(&field.into()),
            message: message.into(),
        }
    }
}

fn camel_case_path(path: &str) -> String {
    path.split('.')
        .map(|segment| {
            if segment.starts_with('_') {
                return segment.to_string();
            }
            let mut out = String::with_capacity(segment.len());
            let mut upper = false;
            for c in segment.chars() {
                if c == '_' {
                    upper = true;
                } else if upper {
                    out.extend(c.to_uppercase());
                    upper = false;
                } else {
                    out.push(c);
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Taxonomia de erros do fluxo de trabalho clínico
///
/// O filtro de visibilidade e a máquina de aprovação devolvem apenas estas
/// variantes; a tradução para a camada de transporte é feita pelo chamador.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Autenticação necessária")]
    Unauthenticated,

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("{0} não encontrado")]
    NotFound(EntityClass),

    #[error("Falha de validação em {} campo(s)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    #[error("Transição inválida: {from} -> {to}")]
    InvalidTransition {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    #[error("Registro em estado {status} não pode ser alterado")]
    NotEditable { status: ApprovalStatus },

    #[error("Conflito de escrita concorrente")]
    Conflict,

    #[error(transparent)]
    Store(#[from] DbError),
}

impl WorkflowError {
    /// Atalho para uma falha de validação em um único campo
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::ValidationFailed(vec![FieldError::new(field, message)])
    }
}

impl From<sqlx::Error> for WorkflowError {
    fn from(error: sqlx::Error) -> Self {
        WorkflowError::Store(error.into())
    }
}

impl From<ValidationErrors> for WorkflowError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        flatten_validation_errors("", &errors, &mut fields);
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        WorkflowError::ValidationFailed(fields)
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

pub(crate) fn flatten_validation_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (name, kind) in errors.errors() {
        let path = match (prefix.is_empty(), *name) {
            (_, "__all__") if prefix.is_empty() => "__all__".to_string(),
            (_, "__all__") => prefix.to_string(),
            (true, name) => name.to_string(),
            (false, name) => format!("{}.{}", prefix, name),
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_validation_errors(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}
