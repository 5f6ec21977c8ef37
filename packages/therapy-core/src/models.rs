//! Modelos de dados do fluxo clínico
//!
//! Este módulo define pacientes, planos terapêuticos, relatórios de evolução,
//! avaliações clínicas e usuários, além da decodificação das linhas SQLite.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use uuid::Uuid;
use validator::Validate;

use crate::access::Role;
use crate::approval::{ApprovalStatus, Reviewable};
use crate::error::FieldError;

/// Lê uma coluna TEXT contendo um UUID
pub(crate) fn uuid_column(row: &SqliteRow, column: &str) -> sqlx::Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn optional_uuid_column(row: &SqliteRow, column: &str) -> sqlx::Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        Uuid::parse_str(&value).map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

/// Lê uma coluna TEXT contendo um enum serializado em snake_case
pub(crate) fn enum_column<T>(row: &SqliteRow, column: &str) -> sqlx::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
    })
}

/// Implementa `Display`/`FromStr` para enums armazenados como TEXT
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($name::$variant => write!(f, $text),)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("Valor inválido para {}: {}", stringify!($name), other)),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Pacientes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

text_enum!(Gender { Male => "male", Female => "female", Other => "other" });

/// Situação do acompanhamento do paciente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Completed,
    Discontinued,
}

text_enum!(PatientStatus {
    Active => "active",
    Completed => "completed",
    Discontinued => "discontinued",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub street: String,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub city: String,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub state: String,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

/// Paciente acompanhado por exatamente um terapeuta
///
/// `medical_history` e `diagnosis` são persistidos criptografados e chegam
/// aqui já em texto claro.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub age: i32,
    pub gender: Gender,
    pub contact_number: String,
    pub email: Option<String>,
    pub address: Address,
    pub medical_history: String,
    pub diagnosis: String,
    pub status: PatientStatus,
    pub total_sessions: i32,
    pub last_session_date: Option<NaiveDate>,
    /// Terapeuta responsável
    pub therapist: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Planos terapêuticos
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Pending,
    InProgress,
    Achieved,
    NotAchieved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub description: String,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub status: GoalStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub name: String,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub description: String,
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub frequency: String,
    /// Duração em minutos
    #[validate(range(min = 1, message = "A duração deve ser positiva"))]
    pub duration: i32,
    pub instructions: Option<String>,
}

/// Plano terapêutico revisado por um supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapyPlan {
    pub id: Uuid,
    pub patient: Uuid,
    pub therapist: Uuid,
    /// Supervisor designado para a revisão
    pub supervisor: Uuid,
    pub goals: Vec<Goal>,
    pub activities: Vec<Activity>,
    pub status: ApprovalStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notes: Option<String>,
    pub supervisor_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for TherapyPlan {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            patient: uuid_column(row, "patient_id")?,
            therapist: uuid_column(row, "therapist_id")?,
            supervisor: uuid_column(row, "supervisor_id")?,
            goals: row.try_get::<Json<Vec<Goal>>, _>("goals")?.0,
            activities: row.try_get::<Json<Vec<Activity>>, _>("activities")?.0,
            status: enum_column(row, "status")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            notes: row.try_get("notes")?,
            supervisor_feedback: row.try_get("supervisor_feedback")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Reviewable for TherapyPlan {
    fn approval_status(&self) -> ApprovalStatus {
        self.status
    }

    fn author(&self) -> Uuid {
        self.therapist
    }

    fn submission_issues(&self) -> Vec<FieldError> {
        let mut issues = Vec::new();
        if self.goals.is_empty() {
            issues.push(FieldError::new("goals", "Pelo menos uma meta é obrigatória"));
        }
        if self.activities.is_empty() {
            issues.push(FieldError::new(
                "activities",
                "Pelo menos uma atividade é obrigatória",
            ));
        }
        if self.end_date < self.start_date {
            issues.push(FieldError::new(
                "end_date",
                "A data final deve ser posterior à data inicial",
            ));
        }
        issues
    }
}

/// Plano com os nomes de exibição das referências
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapyPlanView {
    #[serde(flatten)]
    pub plan: TherapyPlan,
    pub patient_name: String,
    pub therapist_name: String,
    pub supervisor_name: String,
}

impl FromRow<'_, SqliteRow> for TherapyPlanView {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            plan: TherapyPlan::from_row(row)?,
            patient_name: row.try_get("patient_name")?,
            therapist_name: row.try_get("therapist_name")?,
            supervisor_name: row.try_get("supervisor_name")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Relatórios de evolução
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Individual,
    Group,
    Family,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub date: NaiveDate,
    /// Duração em minutos
    #[validate(range(min = 1, message = "A duração deve ser positiva"))]
    pub duration: i32,
    #[serde(rename = "type")]
    pub session_type: SessionType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotes {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
}

/// Relatório de evolução de uma sessão
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub id: Uuid,
    pub patient: Uuid,
    pub therapist: Uuid,
    pub therapy_plan: Option<Uuid>,
    pub session_details: SessionDetails,
    pub progress: ProgressNotes,
    pub next_steps: Vec<String>,
    pub status: ApprovalStatus,
    pub supervisor_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for ProgressReport {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            patient: uuid_column(row, "patient_id")?,
            therapist: uuid_column(row, "therapist_id")?,
            therapy_plan: optional_uuid_column(row, "therapy_plan_id")?,
            session_details: row.try_get::<Json<SessionDetails>, _>("session_details")?.0,
            progress: row.try_get::<Json<ProgressNotes>, _>("progress")?.0,
            next_steps: row.try_get::<Json<Vec<String>>, _>("next_steps")?.0,
            status: enum_column(row, "status")?,
            supervisor_feedback: row.try_get("supervisor_feedback")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn blank_entries(field: &str, entries: &[String], issues: &mut Vec<FieldError>) {
    if entries.is_empty() {
        issues.push(FieldError::new(field, "Pelo menos um item é obrigatório"));
    }
    for (i, entry) in entries.iter().enumerate() {
        if entry.trim().is_empty() {
            issues.push(FieldError::new(format!("{}[{}]", field, i), "Item vazio"));
        }
    }
}

impl Reviewable for ProgressReport {
    fn approval_status(&self) -> ApprovalStatus {
        self.status
    }

    fn author(&self) -> Uuid {
        self.therapist
    }

    fn submission_issues(&self) -> Vec<FieldError> {
        let mut issues = Vec::new();
        if self.session_details.duration <= 0 {
            issues.push(FieldError::new(
                "session_details.duration",
                "A duração da sessão deve ser positiva",
            ));
        }
        blank_entries("progress.goals", &self.progress.goals, &mut issues);
        blank_entries("progress.achievements", &self.progress.achievements, &mut issues);
        blank_entries("progress.challenges", &self.progress.challenges, &mut issues);
        blank_entries("next_steps", &self.next_steps, &mut issues);
        issues
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReportView {
    #[serde(flatten)]
    pub report: ProgressReport,
    pub patient_name: String,
    pub therapist_name: String,
}

impl FromRow<'_, SqliteRow> for ProgressReportView {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            report: ProgressReport::from_row(row)?,
            patient_name: row.try_get("patient_name")?,
            therapist_name: row.try_get("therapist_name")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Avaliações clínicas
// ---------------------------------------------------------------------------

/// Domínios fonoaudiológicos avaliados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingDomain {
    Articulation,
    LanguageComprehension,
    LanguageExpression,
    Voice,
    Fluency,
    Pragmatics,
    FeedingSwallowing,
    Cognition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

text_enum!(RatingStatus {
    Draft => "draft",
    Published => "published",
    Archived => "archived",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OverallRating {
    #[validate(range(min = 1, max = 5, message = "A nota deve estar entre 1 e 5"))]
    pub score: i32,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DomainRating {
    pub domain: RatingDomain,
    #[validate(range(min = 1, max = 5, message = "A nota deve estar entre 1 e 5"))]
    pub score: i32,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Recommendation {
    #[validate(length(min = 1, message = "Campo obrigatório"))]
    pub description: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalRating {
    pub id: Uuid,
    pub patient: Uuid,
    pub therapist: Uuid,
    pub evaluation_period: EvaluationPeriod,
    pub overall_rating: OverallRating,
    pub domain_ratings: Vec<DomainRating>,
    pub recommendations: Vec<Recommendation>,
    pub status: RatingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for ClinicalRating {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            patient: uuid_column(row, "patient_id")?,
            therapist: uuid_column(row, "therapist_id")?,
            evaluation_period: EvaluationPeriod {
                start_date: row.try_get("period_start")?,
                end_date: row.try_get("period_end")?,
            },
            overall_rating: OverallRating {
                score: row.try_get("overall_score")?,
                comments: row.try_get("overall_comments")?,
            },
            domain_ratings: row.try_get::<Json<Vec<DomainRating>>, _>("domain_ratings")?.0,
            recommendations: row.try_get::<Json<Vec<Recommendation>>, _>("recommendations")?.0,
            status: enum_column(row, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalRatingView {
    #[serde(flatten)]
    pub rating: ClinicalRating,
    pub patient_name: String,
}

impl FromRow<'_, SqliteRow> for ClinicalRatingView {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            rating: ClinicalRating::from_row(row)?,
            patient_name: row.try_get("patient_name")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Usuários
// ---------------------------------------------------------------------------

/// Usuário do sistema, sem credenciais
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Papel declarado; valores fora de [`Role`] são aceitos mas não clínicos
    pub role: String,
    pub specialization: String,
    pub experience: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn clinical_role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role: row.try_get("role")?,
            specialization: row.try_get("specialization")?,
            experience: row.try_get("experience")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Usuário com o hash de senha, usado apenas na autenticação
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

impl FromRow<'_, SqliteRow> for UserCredentials {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            user: User::from_row(row)?,
            password_hash: row.try_get("password_hash")?,
        })
    }
}
