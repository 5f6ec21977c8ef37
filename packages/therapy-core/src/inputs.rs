//! Payloads validados de cada operação
//!
//! Os campos obrigatórios são exigidos aqui, na fronteira. As pré-condições
//! de envio para aprovação (metas, atividades, listas de progresso) são
//! verificadas separadamente pela máquina de aprovação, já que um rascunho
//! pode ser salvo incompleto.
//!
//! Campos como `therapist` e `status` não existem nos payloads de criação:
//! o responsável é sempre o usuário autenticado e todo registro nasce em
//! rascunho.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::approval::ApprovalStatus;
use crate::error::{flatten_validation_errors, FieldError, WorkflowError, WorkflowResult};
use crate::models::{
    Activity, Address, DomainRating, EvaluationPeriod, Gender, Goal, OverallRating,
    PatientStatus, ProgressNotes, RatingStatus, Recommendation, SessionDetails,
};

/// Acumula erros de validação antes de decidir o resultado
#[derive(Debug, Default)]
struct Issues(Vec<FieldError>);

impl Issues {
    fn merge(&mut self, prefix: &str, result: Result<(), ValidationErrors>) {
        if let Err(errors) = result {
            flatten_validation_errors(prefix, &errors, &mut self.0);
        }
    }

    fn merge_each<T: Validate>(&mut self, field: &str, items: &[T]) {
        for (i, item) in items.iter().enumerate() {
            self.merge(&format!("{}[{}]", field, i), item.validate());
        }
    }

    fn push(&mut self, field: &str, message: &str) {
        self.0.push(FieldError::new(field, message));
    }

    fn finish(mut self) -> WorkflowResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            self.0.sort_by(|a, b| a.field.cmp(&b.field));
            Err(WorkflowError::ValidationFailed(self.0))
        }
    }
}

fn check_period(issues: &mut Issues, field: &str, start: NaiveDate, end: NaiveDate) {
    if end < start {
        issues.push(field, "A data final deve ser posterior à data inicial");
    }
}

// ---------------------------------------------------------------------------
// Pacientes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientInput {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub name: String,
    #[validate(range(min = 0, max = 130, message = "Idade inválida"))]
    pub age: i32,
    pub gender: Gender,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub contact_number: String,
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
    #[validate]
    pub address: Address,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub medical_history: String,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub diagnosis: String,
    pub status: Option<PatientStatus>,
    #[validate(range(min = 0, message = "Valor não pode ser negativo"))]
    pub total_sessions: Option<i32>,
    pub last_session_date: Option<NaiveDate>,
}

impl CreatePatientInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatientInput {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub name: Option<String>,
    #[validate(range(min = 0, max = 130, message = "Idade inválida"))]
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub contact_number: Option<String>,
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
    pub address: Option<Address>,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub medical_history: Option<String>,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub diagnosis: Option<String>,
    pub status: Option<PatientStatus>,
    #[validate(range(min = 0, message = "Valor não pode ser negativo"))]
    pub total_sessions: Option<i32>,
    pub last_session_date: Option<NaiveDate>,
}

impl UpdatePatientInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        if let Some(address) = &self.address {
            issues.merge("address", address.validate());
        }
        issues.finish()
    }
}

// ---------------------------------------------------------------------------
// Planos terapêuticos
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanInput {
    pub patient: Uuid,
    /// Supervisor que revisará o plano
    pub supervisor: Uuid,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(length(max = 4000, message = "Texto muito longo"))]
    pub notes: Option<String>,
}

impl CreatePlanInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.merge_each("goals", &self.goals);
        issues.merge_each("activities", &self.activities);
        check_period(&mut issues, "end_date", self.start_date, self.end_date);
        issues.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanInput {
    pub supervisor: Option<Uuid>,
    pub goals: Option<Vec<Goal>>,
    pub activities: Option<Vec<Activity>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(length(max = 4000, message = "Texto muito longo"))]
    pub notes: Option<String>,
}

impl UpdatePlanInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        if let Some(goals) = &self.goals {
            issues.merge_each("goals", goals);
        }
        if let Some(activities) = &self.activities {
            issues.merge_each("activities", activities);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            check_period(&mut issues, "end_date", start, end);
        }
        issues.finish()
    }
}

// ---------------------------------------------------------------------------
// Relatórios de evolução
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportInput {
    pub patient: Uuid,
    pub therapy_plan: Option<Uuid>,
    #[validate]
    pub session_details: SessionDetails,
    #[serde(default)]
    pub progress: ProgressNotes,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl CreateReportInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportInput {
    pub therapy_plan: Option<Uuid>,
    pub session_details: Option<SessionDetails>,
    pub progress: Option<ProgressNotes>,
    pub next_steps: Option<Vec<String>>,
}

impl UpdateReportInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        if let Some(details) = &self.session_details {
            issues.merge("session_details", details.validate());
        }
        issues.finish()
    }
}

// ---------------------------------------------------------------------------
// Avaliações clínicas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRatingInput {
    pub patient: Uuid,
    pub evaluation_period: EvaluationPeriod,
    #[validate]
    pub overall_rating: OverallRating,
    #[serde(default)]
    pub domain_ratings: Vec<DomainRating>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    pub status: Option<RatingStatus>,
}

impl CreateRatingInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.merge_each("domain_ratings", &self.domain_ratings);
        issues.merge_each("recommendations", &self.recommendations);
        check_period(
            &mut issues,
            "evaluation_period.end_date",
            self.evaluation_period.start_date,
            self.evaluation_period.end_date,
        );
        issues.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRatingInput {
    pub evaluation_period: Option<EvaluationPeriod>,
    pub overall_rating: Option<OverallRating>,
    pub domain_ratings: Option<Vec<DomainRating>>,
    pub recommendations: Option<Vec<Recommendation>>,
    pub status: Option<RatingStatus>,
}

impl UpdateRatingInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        if let Some(period) = &self.evaluation_period {
            check_period(
                &mut issues,
                "evaluation_period.end_date",
                period.start_date,
                period.end_date,
            );
        }
        if let Some(overall) = &self.overall_rating {
            issues.merge("overall_rating", overall.validate());
        }
        if let Some(domains) = &self.domain_ratings {
            issues.merge_each("domain_ratings", domains);
        }
        if let Some(recommendations) = &self.recommendations {
            issues.merge_each("recommendations", recommendations);
        }
        issues.finish()
    }
}

// ---------------------------------------------------------------------------
// Transições e usuários
// ---------------------------------------------------------------------------

/// Filtros opcionais das listagens, combinados com a visibilidade do papel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub patient: Option<Uuid>,
    pub status: Option<String>,
}

/// Pedido genérico de mudança de status
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransitionInput {
    pub status: ApprovalStatus,
    #[validate(length(max = 4000, message = "Texto muito longo"))]
    pub feedback: Option<String>,
}

impl TransitionInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.finish()
    }
}

/// Corpo dos endpoints de aprovação e rejeição
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct FeedbackInput {
    #[validate(length(max = 4000, message = "Texto muito longo"))]
    pub feedback: Option<String>,
}

impl FeedbackInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.finish()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub name: String,
    #[validate(email(message = "E-mail inválido"))]
    pub email: String,
    #[validate(length(min = 8, message = "A senha deve ter pelo menos 8 caracteres"))]
    pub password: String,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub role: String,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub specialization: String,
    #[validate(range(min = 0, message = "Valor não pode ser negativo"))]
    pub experience: i32,
}

impl RegisterInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Campos do perfil que o próprio usuário pode alterar
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub name: Option<String>,
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub specialization: Option<String>,
    #[validate(range(min = 0, message = "Valor não pode ser negativo"))]
    pub experience: Option<i32>,
}

impl UpdateProfileInput {
    pub fn check(&self) -> WorkflowResult<()> {
        let mut issues = Issues::default();
        issues.merge("", self.validate());
        issues.finish()
    }
}
