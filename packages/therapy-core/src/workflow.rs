//! Orquestrador das operações clínicas
//!
//! Cada operação segue o mesmo caminho: calcula o filtro de visibilidade do
//! principal, localiza o registro pelo filtro, aplica a regra de negócio e só
//! então grava. Registros fora do alcance do principal respondem `NotFound`,
//! exatamente como registros inexistentes.

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::access::{compute_filter, EntityClass, Principal, RecordFilter, Role};
use crate::approval::{attempt_transition, ApprovalStatus, TransitionOutcome};
use crate::error::{DbError, WorkflowError, WorkflowResult};
use crate::inputs::{
    CreatePatientInput, CreatePlanInput, CreateRatingInput, CreateReportInput, ListQuery,
    RegisterInput, UpdatePatientInput, UpdatePlanInput, UpdateProfileInput, UpdateRatingInput,
    UpdateReportInput,
};
use crate::models::{
    ClinicalRating, ClinicalRatingView, Patient, PatientStatus, ProgressReport,
    ProgressReportView, RatingStatus, TherapyPlan, TherapyPlanView, User, UserCredentials,
};
use crate::store::Store;

/// Apenas terapeutas criam, editam e removem registros clínicos
fn require_therapist(principal: &Principal) -> WorkflowResult<Uuid> {
    match principal {
        Principal::Therapist(id) => Ok(*id),
        _ => Err(WorkflowError::Forbidden(
            "Apenas terapeutas podem alterar registros clínicos".to_string(),
        )),
    }
}

fn email_taken(error: DbError) -> WorkflowError {
    match error {
        DbError::ConstraintViolation(_) => WorkflowError::field("email", "E-mail já cadastrado"),
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct Workflow {
    store: Store,
}

impl Workflow {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn list_filter(principal: &Principal, class: EntityClass, query: &ListQuery) -> RecordFilter {
        compute_filter(principal, class)
            .with_patient(query.patient)
            .with_status(query.status.clone())
    }

    async fn ensure_patient_visible(&self, principal: &Principal, patient: Uuid) -> WorkflowResult<()> {
        let filter = compute_filter(principal, EntityClass::Patient).with_id(patient);
        if self.store.exists(&filter).await? {
            Ok(())
        } else {
            Err(WorkflowError::field("patient", "Paciente não encontrado"))
        }
    }

    async fn ensure_supervisor(&self, supervisor: Uuid) -> WorkflowResult<()> {
        let user = self.store.find_user(supervisor).await?;
        match user.and_then(|u| u.clinical_role()) {
            Some(Role::Supervisor) => Ok(()),
            _ => Err(WorkflowError::field(
                "supervisor",
                "O revisor deve ser um supervisor cadastrado",
            )),
        }
    }

    async fn ensure_plan_of_patient(
        &self,
        principal: &Principal,
        plan: Uuid,
        patient: Uuid,
    ) -> WorkflowResult<()> {
        let filter = compute_filter(principal, EntityClass::TherapyPlan)
            .with_id(plan)
            .with_patient(Some(patient));
        if self.store.exists(&filter).await? {
            Ok(())
        } else {
            Err(WorkflowError::field(
                "therapy_plan",
                "Plano terapêutico não encontrado para este paciente",
            ))
        }
    }

    /// Planos e relatórios aprovados são permanentes, inclusive pela remoção do paciente
    async fn has_approved_records(&self, patient: Uuid) -> WorkflowResult<bool> {
        for class in [EntityClass::TherapyPlan, EntityClass::ProgressReport] {
            let filter = RecordFilter::all(class)
                .with_patient(Some(patient))
                .with_status(Some(ApprovalStatus::Approved.to_string()));
            if self.store.exists(&filter).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Grava o resultado de uma transição; outro pedido vencendo a corrida gera `Conflict`
    async fn commit_transition(
        &self,
        class: EntityClass,
        id: Uuid,
        outcome: &TransitionOutcome,
    ) -> WorkflowResult<()> {
        let written = self
            .store
            .compare_and_set_status(class, id, outcome, Utc::now())
            .await?;
        if !written {
            warn!(%class, %id, from = %outcome.from, to = %outcome.status, "Status alterado por outra requisição");
            return Err(WorkflowError::Conflict);
        }
        info!(%class, %id, from = %outcome.from, to = %outcome.status, "Transição registrada");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pacientes
    // -----------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_patients(
        &self,
        principal: &Principal,
        query: &ListQuery,
    ) -> WorkflowResult<Vec<Patient>> {
        let filter = Self::list_filter(principal, EntityClass::Patient, query);
        if filter.is_empty_match() {
            return Ok(Vec::new());
        }
        Ok(self.store.list_patients(&filter).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_patient(&self, principal: &Principal, id: Uuid) -> WorkflowResult<Patient> {
        let filter = compute_filter(principal, EntityClass::Patient).with_id(id);
        self.store
            .find_patient(&filter)
            .await?
            .ok_or(WorkflowError::NotFound(EntityClass::Patient))
    }

    #[instrument(skip(self, input))]
    pub async fn create_patient(
        &self,
        principal: &Principal,
        input: CreatePatientInput,
    ) -> WorkflowResult<Patient> {
        let therapist = require_therapist(principal)?;
        input.check()?;

        let now = Utc::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: input.name,
            age: input.age,
            gender: input.gender,
            contact_number: input.contact_number,
            email: input.email,
            address: input.address,
            medical_history: input.medical_history,
            diagnosis: input.diagnosis,
            status: input.status.unwrap_or(PatientStatus::Active),
            total_sessions: input.total_sessions.unwrap_or(0),
            last_session_date: input.last_session_date,
            therapist,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_patient(&patient).await?;
        info!(patient = %patient.id, "Paciente cadastrado");
        Ok(patient)
    }

    #[instrument(skip(self, input))]
    pub async fn update_patient(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdatePatientInput,
    ) -> WorkflowResult<Patient> {
        require_therapist(principal)?;
        input.check()?;

        let mut patient = self.get_patient(principal, id).await?;
        if let Some(name) = input.name {
            patient.name = name;
        }
        if let Some(age) = input.age {
            patient.age = age;
        }
        if let Some(gender) = input.gender {
            patient.gender = gender;
        }
        if let Some(contact_number) = input.contact_number {
            patient.contact_number = contact_number;
        }
        if input.email.is_some() {
            patient.email = input.email;
        }
        if let Some(address) = input.address {
            patient.address = address;
        }
        if let Some(history) = input.medical_history {
            patient.medical_history = history;
        }
        if let Some(diagnosis) = input.diagnosis {
            patient.diagnosis = diagnosis;
        }
        if let Some(status) = input.status {
            patient.status = status;
        }
        if let Some(total) = input.total_sessions {
            patient.total_sessions = total;
        }
        if input.last_session_date.is_some() {
            patient.last_session_date = input.last_session_date;
        }
        patient.updated_at = Utc::now();

        if !self.store.update_patient(&patient).await? {
            return Err(WorkflowError::NotFound(EntityClass::Patient));
        }
        Ok(patient)
    }

    #[instrument(skip(self))]
    pub async fn delete_patient(&self, principal: &Principal, id: Uuid) -> WorkflowResult<()> {
        require_therapist(principal)?;
        let filter = compute_filter(principal, EntityClass::Patient).with_id(id);
        if !self.store.exists(&filter).await? {
            return Err(WorkflowError::NotFound(EntityClass::Patient));
        }
        if self.has_approved_records(id).await? {
            warn!(patient = %id, "Paciente com registros aprovados não pode ser removido");
            return Err(WorkflowError::NotEditable {
                status: ApprovalStatus::Approved,
            });
        }
        if !self.store.delete_patient(&filter).await? {
            return Err(WorkflowError::Conflict);
        }
        info!(patient = %id, "Paciente removido");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Planos terapêuticos
    // -----------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_plans(
        &self,
        principal: &Principal,
        query: &ListQuery,
    ) -> WorkflowResult<Vec<TherapyPlanView>> {
        let filter = Self::list_filter(principal, EntityClass::TherapyPlan, query);
        if filter.is_empty_match() {
            return Ok(Vec::new());
        }
        Ok(self.store.list_plans(&filter).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_plan(&self, principal: &Principal, id: Uuid) -> WorkflowResult<TherapyPlanView> {
        let filter = compute_filter(principal, EntityClass::TherapyPlan).with_id(id);
        self.store
            .find_plan(&filter)
            .await?
            .ok_or(WorkflowError::NotFound(EntityClass::TherapyPlan))
    }

    #[instrument(skip(self, input))]
    pub async fn create_plan(
        &self,
        principal: &Principal,
        input: CreatePlanInput,
    ) -> WorkflowResult<TherapyPlanView> {
        let therapist = require_therapist(principal)?;
        input.check()?;
        self.ensure_patient_visible(principal, input.patient).await?;
        self.ensure_supervisor(input.supervisor).await?;

        let now = Utc::now();
        let plan = TherapyPlan {
            id: Uuid::new_v4(),
            patient: input.patient,
            therapist,
            supervisor: input.supervisor,
            goals: input.goals,
            activities: input.activities,
            status: ApprovalStatus::Draft,
            start_date: input.start_date,
            end_date: input.end_date,
            notes: input.notes,
            supervisor_feedback: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_plan(&plan).await?;
        info!(plan = %plan.id, patient = %plan.patient, "Plano terapêutico criado");
        self.get_plan(principal, plan.id).await
    }

    /// Altera o conteúdo de um plano em rascunho ou rejeitado
    #[instrument(skip(self, input))]
    pub async fn update_plan(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdatePlanInput,
    ) -> WorkflowResult<TherapyPlanView> {
        require_therapist(principal)?;
        input.check()?;

        let mut plan = self.get_plan(principal, id).await?.plan;
        let expected = plan.status;
        if !expected.is_editable() {
            return Err(WorkflowError::NotEditable { status: expected });
        }

        if let Some(supervisor) = input.supervisor {
            if supervisor != plan.supervisor {
                self.ensure_supervisor(supervisor).await?;
            }
            plan.supervisor = supervisor;
        }
        if let Some(goals) = input.goals {
            plan.goals = goals;
        }
        if let Some(activities) = input.activities {
            plan.activities = activities;
        }
        if let Some(start) = input.start_date {
            plan.start_date = start;
        }
        if let Some(end) = input.end_date {
            plan.end_date = end;
        }
        if input.notes.is_some() {
            plan.notes = input.notes;
        }
        if plan.end_date < plan.start_date {
            return Err(WorkflowError::field(
                "end_date",
                "A data final deve ser posterior à data inicial",
            ));
        }
        plan.updated_at = Utc::now();

        if !self.store.update_plan_content(&plan, expected).await? {
            warn!(plan = %id, "Plano alterado por outra requisição durante a edição");
            return Err(WorkflowError::Conflict);
        }
        self.get_plan(principal, id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_plan(&self, principal: &Principal, id: Uuid) -> WorkflowResult<()> {
        require_therapist(principal)?;
        let plan = self.get_plan(principal, id).await?.plan;
        if plan.status == ApprovalStatus::Approved {
            return Err(WorkflowError::NotEditable {
                status: plan.status,
            });
        }

        let filter = compute_filter(principal, EntityClass::TherapyPlan)
            .with_id(id)
            .with_status(Some(plan.status.to_string()));
        if !self.store.delete(&filter).await? {
            return Err(WorkflowError::Conflict);
        }
        info!(plan = %id, "Plano terapêutico removido");
        Ok(())
    }

    /// Leva o plano ao status `requested` conforme a tabela de transições
    #[instrument(skip(self, feedback))]
    pub async fn transition_plan(
        &self,
        principal: &Principal,
        id: Uuid,
        requested: ApprovalStatus,
        feedback: Option<&str>,
    ) -> WorkflowResult<TherapyPlanView> {
        let current = self.get_plan(principal, id).await?;
        let outcome = attempt_transition(&current.plan, requested, principal, feedback)?;
        self.commit_transition(EntityClass::TherapyPlan, id, &outcome)
            .await?;
        self.get_plan(principal, id).await
    }

    // -----------------------------------------------------------------------
    // Relatórios de evolução
    // -----------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_reports(
        &self,
        principal: &Principal,
        query: &ListQuery,
    ) -> WorkflowResult<Vec<ProgressReportView>> {
        let filter = Self::list_filter(principal, EntityClass::ProgressReport, query);
        if filter.is_empty_match() {
            return Ok(Vec::new());
        }
        Ok(self.store.list_reports(&filter).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_report(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> WorkflowResult<ProgressReportView> {
        let filter = compute_filter(principal, EntityClass::ProgressReport).with_id(id);
        self.store
            .find_report(&filter)
            .await?
            .ok_or(WorkflowError::NotFound(EntityClass::ProgressReport))
    }

    #[instrument(skip(self, input))]
    pub async fn create_report(
        &self,
        principal: &Principal,
        input: CreateReportInput,
    ) -> WorkflowResult<ProgressReportView> {
        let therapist = require_therapist(principal)?;
        input.check()?;
        self.ensure_patient_visible(principal, input.patient).await?;
        if let Some(plan) = input.therapy_plan {
            self.ensure_plan_of_patient(principal, plan, input.patient)
                .await?;
        }

        let now = Utc::now();
        let report = ProgressReport {
            id: Uuid::new_v4(),
            patient: input.patient,
            therapist,
            therapy_plan: input.therapy_plan,
            session_details: input.session_details,
            progress: input.progress,
            next_steps: input.next_steps,
            status: ApprovalStatus::Draft,
            supervisor_feedback: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_report(&report).await?;
        info!(report = %report.id, patient = %report.patient, "Relatório de evolução criado");
        self.get_report(principal, report.id).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_report(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdateReportInput,
    ) -> WorkflowResult<ProgressReportView> {
        require_therapist(principal)?;
        input.check()?;

        let mut report = self.get_report(principal, id).await?.report;
        let expected = report.status;
        if !expected.is_editable() {
            return Err(WorkflowError::NotEditable { status: expected });
        }

        if let Some(plan) = input.therapy_plan {
            if report.therapy_plan != Some(plan) {
                self.ensure_plan_of_patient(principal, plan, report.patient)
                    .await?;
            }
            report.therapy_plan = Some(plan);
        }
        if let Some(details) = input.session_details {
            report.session_details = details;
        }
        if let Some(progress) = input.progress {
            report.progress = progress;
        }
        if let Some(next_steps) = input.next_steps {
            report.next_steps = next_steps;
        }
        report.updated_at = Utc::now();

        if !self.store.update_report_content(&report, expected).await? {
            warn!(report = %id, "Relatório alterado por outra requisição durante a edição");
            return Err(WorkflowError::Conflict);
        }
        self.get_report(principal, id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_report(&self, principal: &Principal, id: Uuid) -> WorkflowResult<()> {
        require_therapist(principal)?;
        let report = self.get_report(principal, id).await?.report;
        if report.status == ApprovalStatus::Approved {
            return Err(WorkflowError::NotEditable {
                status: report.status,
            });
        }

        let filter = compute_filter(principal, EntityClass::ProgressReport)
            .with_id(id)
            .with_status(Some(report.status.to_string()));
        if !self.store.delete(&filter).await? {
            return Err(WorkflowError::Conflict);
        }
        info!(report = %id, "Relatório de evolução removido");
        Ok(())
    }

    #[instrument(skip(self, feedback))]
    pub async fn transition_report(
        &self,
        principal: &Principal,
        id: Uuid,
        requested: ApprovalStatus,
        feedback: Option<&str>,
    ) -> WorkflowResult<ProgressReportView> {
        let current = self.get_report(principal, id).await?;
        let outcome = attempt_transition(&current.report, requested, principal, feedback)?;
        self.commit_transition(EntityClass::ProgressReport, id, &outcome)
            .await?;
        self.get_report(principal, id).await
    }

    // -----------------------------------------------------------------------
    // Avaliações clínicas
    // -----------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_ratings(
        &self,
        principal: &Principal,
        query: &ListQuery,
    ) -> WorkflowResult<Vec<ClinicalRatingView>> {
        let filter = Self::list_filter(principal, EntityClass::ClinicalRating, query);
        if filter.is_empty_match() {
            return Ok(Vec::new());
        }
        Ok(self.store.list_ratings(&filter).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_rating(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> WorkflowResult<ClinicalRatingView> {
        let filter = compute_filter(principal, EntityClass::ClinicalRating).with_id(id);
        self.store
            .find_rating(&filter)
            .await?
            .ok_or(WorkflowError::NotFound(EntityClass::ClinicalRating))
    }

    #[instrument(skip(self, input))]
    pub async fn create_rating(
        &self,
        principal: &Principal,
        input: CreateRatingInput,
    ) -> WorkflowResult<ClinicalRatingView> {
        let therapist = require_therapist(principal)?;
        input.check()?;
        self.ensure_patient_visible(principal, input.patient).await?;

        let now = Utc::now();
        let rating = ClinicalRating {
            id: Uuid::new_v4(),
            patient: input.patient,
            therapist,
            evaluation_period: input.evaluation_period,
            overall_rating: input.overall_rating,
            domain_ratings: input.domain_ratings,
            recommendations: input.recommendations,
            status: input.status.unwrap_or(RatingStatus::Draft),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_rating(&rating).await?;
        info!(rating = %rating.id, patient = %rating.patient, "Avaliação clínica criada");
        self.get_rating(principal, rating.id).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_rating(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdateRatingInput,
    ) -> WorkflowResult<ClinicalRatingView> {
        require_therapist(principal)?;
        input.check()?;

        let mut rating = self.get_rating(principal, id).await?.rating;
        if let Some(period) = input.evaluation_period {
            rating.evaluation_period = period;
        }
        if let Some(overall) = input.overall_rating {
            rating.overall_rating = overall;
        }
        if let Some(domains) = input.domain_ratings {
            rating.domain_ratings = domains;
        }
        if let Some(recommendations) = input.recommendations {
            rating.recommendations = recommendations;
        }
        if let Some(status) = input.status {
            rating.status = status;
        }
        rating.updated_at = Utc::now();

        if !self.store.update_rating(&rating).await? {
            return Err(WorkflowError::NotFound(EntityClass::ClinicalRating));
        }
        self.get_rating(principal, id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_rating(&self, principal: &Principal, id: Uuid) -> WorkflowResult<()> {
        require_therapist(principal)?;
        let filter = compute_filter(principal, EntityClass::ClinicalRating).with_id(id);
        if !self.store.delete(&filter).await? {
            return Err(WorkflowError::NotFound(EntityClass::ClinicalRating));
        }
        info!(rating = %id, "Avaliação clínica removida");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Usuários
    // -----------------------------------------------------------------------

    /// Cadastra um usuário com a senha já transformada em hash
    #[instrument(skip(self, input, password_hash), fields(email = %input.email))]
    pub async fn register_user(
        &self,
        input: &RegisterInput,
        password_hash: &str,
    ) -> WorkflowResult<User> {
        input.check()?;

        let user = User {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            email: input.email.clone(),
            role: input.role.clone(),
            specialization: input.specialization.clone(),
            experience: input.experience,
            created_at: Utc::now(),
        };
        self.store
            .insert_user(&user, password_hash)
            .await
            .map_err(email_taken)?;
        info!(user = %user.id, role = %user.role, "Usuário cadastrado");
        Ok(user)
    }

    pub async fn credentials(&self, email: &str) -> WorkflowResult<Option<UserCredentials>> {
        Ok(self.store.find_credentials_by_email(email).await?)
    }

    /// Perfil do próprio principal; conta removida conta como não autenticada
    pub async fn profile(&self, principal: &Principal) -> WorkflowResult<User> {
        self.store
            .find_user(principal.id())
            .await?
            .ok_or(WorkflowError::Unauthenticated)
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        principal: &Principal,
        input: UpdateProfileInput,
    ) -> WorkflowResult<User> {
        input.check()?;

        let mut user = self.profile(principal).await?;
        if let Some(name) = input.name {
            user.name = name;
        }
        if let Some(email) = input.email {
            user.email = email;
        }
        if let Some(specialization) = input.specialization {
            user.specialization = specialization;
        }
        if let Some(experience) = input.experience {
            user.experience = experience;
        }

        if !self.store.update_user(&user).await.map_err(email_taken)? {
            return Err(WorkflowError::Unauthenticated);
        }
        Ok(user)
    }

    pub async fn list_users(&self, role: Option<&str>) -> WorkflowResult<Vec<User>> {
        Ok(self.store.list_users(role).await?)
    }

    pub async fn list_supervisors(&self) -> WorkflowResult<Vec<User>> {
        let role = Role::Supervisor.to_string();
        self.list_users(Some(&role)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Activity, Address, EvaluationPeriod, Gender, Goal, GoalStatus, OverallRating,
        ProgressNotes, SessionDetails, SessionType,
    };
    use crate::test_support::{seed_supervisor, seed_therapist, seed_user, temp_store, TestStore};
    use anyhow::Result;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn patient_input(name: &str) -> CreatePatientInput {
        CreatePatientInput {
            name: name.to_string(),
            age: 7,
            gender: Gender::Female,
            contact_number: "+55 11 99999-0000".to_string(),
            email: Some("familia@example.com".to_string()),
            address: Address {
                street: "Rua das Flores, 10".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                zip_code: None,
                country: Some("Brasil".to_string()),
            },
            medical_history: "Otites de repetição".to_string(),
            diagnosis: "Transtorno fonológico".to_string(),
            status: None,
            total_sessions: None,
            last_session_date: None,
        }
    }

    fn goal(description: &str) -> Goal {
        Goal {
            description: description.to_string(),
            target_date: date(2024, 6, 1),
            status: GoalStatus::Pending,
        }
    }

    fn activity() -> Activity {
        Activity {
            name: "Pares mínimos".to_string(),
            description: "Discriminação auditiva com figuras".to_string(),
            frequency: "2x por semana".to_string(),
            duration: 30,
            instructions: None,
        }
    }

    fn plan_input(patient: Uuid, supervisor: Uuid, goals: Vec<Goal>) -> CreatePlanInput {
        CreatePlanInput {
            patient,
            supervisor,
            goals,
            activities: vec![activity()],
            start_date: date(2024, 1, 1),
            end_date: date(2024, 6, 30),
            notes: Some("Reavaliar em junho".to_string()),
        }
    }

    fn report_input(patient: Uuid) -> CreateReportInput {
        CreateReportInput {
            patient,
            therapy_plan: None,
            session_details: SessionDetails {
                date: date(2024, 3, 1),
                duration: 60,
                session_type: SessionType::Individual,
            },
            progress: ProgressNotes {
                goals: vec!["Improve pronunciation".to_string()],
                achievements: vec!["Produziu /r/ isolado".to_string()],
                challenges: vec!["Generalização em frases".to_string()],
            },
            next_steps: vec!["Treino em palavras".to_string()],
        }
    }

    struct Clinic {
        _db: TestStore,
        workflow: Workflow,
        therapist: Principal,
        other_therapist: Principal,
        supervisor: Principal,
        patient: Uuid,
    }

    async fn clinic() -> Result<Clinic> {
        let db = temp_store().await?;
        let workflow = Workflow::new(db.store.clone());
        let therapist = seed_therapist(&db.store, "Ana").await?;
        let other_therapist = seed_therapist(&db.store, "Bruno").await?;
        let supervisor = seed_supervisor(&db.store, "Carla").await?;
        let patient = workflow
            .create_patient(&therapist, patient_input("Davi"))
            .await?
            .id;
        Ok(Clinic {
            _db: db,
            workflow,
            therapist,
            other_therapist,
            supervisor,
            patient,
        })
    }

    #[tokio::test]
    async fn clinical_fields_are_encrypted_at_rest() -> Result<()> {
        let c = clinic().await?;
        let stored: Vec<u8> =
            sqlx::query_scalar("SELECT diagnosis_ciphertext FROM patients WHERE id = ?")
                .bind(c.patient.to_string())
                .fetch_one(c.workflow.store().pool())
                .await?;
        assert_ne!(stored, "Transtorno fonológico".as_bytes().to_vec());

        let patient = c.workflow.get_patient(&c.therapist, c.patient).await?;
        assert_eq!(patient.diagnosis, "Transtorno fonológico");
        assert_eq!(patient.status, PatientStatus::Active);
        Ok(())
    }

    fn rating_input(patient: Uuid) -> CreateRatingInput {
        CreateRatingInput {
            patient,
            evaluation_period: EvaluationPeriod {
                start_date: date(2024, 1, 1),
                end_date: date(2024, 3, 31),
            },
            overall_rating: OverallRating {
                score: 3,
                comments: Some("Evolução gradual".to_string()),
            },
            domain_ratings: vec![],
            recommendations: vec![],
            status: None,
        }
    }

    fn is_not_found<T>(result: WorkflowResult<T>, class: EntityClass) -> bool {
        matches!(result, Err(WorkflowError::NotFound(c)) if c == class)
    }

    #[tokio::test]
    async fn therapists_never_reach_each_others_records() -> Result<()> {
        let c = clinic().await?;
        let plan = c
            .workflow
            .create_plan(
                &c.therapist,
                plan_input(c.patient, c.supervisor.id(), vec![goal("Ampliar vocabulário")]),
            )
            .await?
            .plan
            .id;
        let report = c
            .workflow
            .create_report(&c.therapist, report_input(c.patient))
            .await?
            .report
            .id;
        let rating = c
            .workflow
            .create_rating(&c.therapist, rating_input(c.patient))
            .await?
            .rating
            .id;
        let other = &c.other_therapist;
        let w = &c.workflow;

        // Leitura
        assert!(is_not_found(w.get_patient(other, c.patient).await, EntityClass::Patient));
        assert!(is_not_found(w.get_plan(other, plan).await, EntityClass::TherapyPlan));
        assert!(is_not_found(w.get_report(other, report).await, EntityClass::ProgressReport));
        assert!(is_not_found(w.get_rating(other, rating).await, EntityClass::ClinicalRating));

        // Alteração
        assert!(is_not_found(
            w.update_patient(other, c.patient, UpdatePatientInput::default()).await,
            EntityClass::Patient
        ));
        assert!(is_not_found(
            w.update_plan(other, plan, UpdatePlanInput::default()).await,
            EntityClass::TherapyPlan
        ));
        assert!(is_not_found(
            w.update_report(other, report, UpdateReportInput::default()).await,
            EntityClass::ProgressReport
        ));
        assert!(is_not_found(
            w.update_rating(other, rating, UpdateRatingInput::default()).await,
            EntityClass::ClinicalRating
        ));

        // Remoção
        assert!(is_not_found(w.delete_plan(other, plan).await, EntityClass::TherapyPlan));
        assert!(is_not_found(w.delete_report(other, report).await, EntityClass::ProgressReport));
        assert!(is_not_found(w.delete_rating(other, rating).await, EntityClass::ClinicalRating));
        assert!(is_not_found(w.delete_patient(other, c.patient).await, EntityClass::Patient));

        // Transições também passam pelo filtro
        assert!(is_not_found(
            w.transition_plan(other, plan, ApprovalStatus::PendingApproval, None).await,
            EntityClass::TherapyPlan
        ));

        let empty = ListQuery::default();
        assert!(w.list_patients(other, &empty).await?.is_empty());
        assert!(w.list_plans(other, &empty).await?.is_empty());
        assert!(w.list_reports(other, &empty).await?.is_empty());
        assert!(w.list_ratings(other, &empty).await?.is_empty());

        // O outro terapeuta também não pode criar registros para este paciente
        let denied = w.create_report(other, report_input(c.patient)).await;
        assert!(matches!(denied, Err(WorkflowError::ValidationFailed(_))));

        // Nada foi alterado e o supervisor enxerga tudo
        let sup = &c.supervisor;
        assert_eq!(w.get_patient(sup, c.patient).await?.name, "Davi");
        let plan_view = w.get_plan(sup, plan).await?;
        assert_eq!(plan_view.patient_name, "Davi");
        assert_eq!(plan_view.therapist_name, "Ana");
        assert_eq!(plan_view.supervisor_name, "Carla");
        assert_eq!(w.get_report(sup, report).await?.therapist_name, "Ana");
        assert_eq!(w.get_rating(sup, rating).await?.patient_name, "Davi");
        assert_eq!(w.list_plans(sup, &empty).await?.len(), 1);
        assert_eq!(w.list_reports(sup, &empty).await?.len(), 1);
        assert_eq!(w.list_ratings(sup, &empty).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn patient_with_approved_records_cannot_be_deleted() -> Result<()> {
        let c = clinic().await?;
        let plan = c
            .workflow
            .create_plan(&c.therapist, plan_input(c.patient, c.supervisor.id(), vec![goal("Meta")]))
            .await?
            .plan
            .id;
        c.workflow
            .transition_plan(&c.therapist, plan, ApprovalStatus::PendingApproval, None)
            .await?;
        c.workflow
            .transition_plan(&c.supervisor, plan, ApprovalStatus::Approved, None)
            .await?;

        assert!(matches!(
            c.workflow.delete_patient(&c.therapist, c.patient).await,
            Err(WorkflowError::NotEditable {
                status: ApprovalStatus::Approved
            })
        ));
        let kept = c.workflow.get_plan(&c.supervisor, plan).await?;
        assert_eq!(kept.plan.status, ApprovalStatus::Approved);
        c.workflow.get_patient(&c.therapist, c.patient).await?;

        // Um relatório aprovado também bloqueia a remoção
        let second = c
            .workflow
            .create_patient(&c.therapist, patient_input("Elisa"))
            .await?
            .id;
        let report = c
            .workflow
            .create_report(&c.therapist, report_input(second))
            .await?
            .report
            .id;
        c.workflow
            .transition_report(&c.therapist, report, ApprovalStatus::PendingApproval, None)
            .await?;
        c.workflow
            .transition_report(&c.supervisor, report, ApprovalStatus::Approved, None)
            .await?;
        assert!(matches!(
            c.workflow.delete_patient(&c.therapist, second).await,
            Err(WorkflowError::NotEditable { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn deleting_a_patient_removes_unapproved_records() -> Result<()> {
        let c = clinic().await?;
        let plan = c
            .workflow
            .create_plan(&c.therapist, plan_input(c.patient, c.supervisor.id(), vec![goal("Meta")]))
            .await?
            .plan
            .id;
        c.workflow
            .transition_plan(&c.therapist, plan, ApprovalStatus::PendingApproval, None)
            .await?;
        c.workflow
            .transition_plan(&c.supervisor, plan, ApprovalStatus::Rejected, Some("Detalhar"))
            .await?;
        c.workflow
            .create_report(&c.therapist, report_input(c.patient))
            .await?;
        c.workflow
            .create_rating(&c.therapist, rating_input(c.patient))
            .await?;

        c.workflow.delete_patient(&c.therapist, c.patient).await?;

        let empty = ListQuery::default();
        assert!(is_not_found(
            c.workflow.get_patient(&c.supervisor, c.patient).await,
            EntityClass::Patient
        ));
        assert!(c.workflow.list_plans(&c.supervisor, &empty).await?.is_empty());
        assert!(c.workflow.list_reports(&c.supervisor, &empty).await?.is_empty());
        assert!(c.workflow.list_ratings(&c.supervisor, &empty).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn restricted_principal_sees_nothing() -> Result<()> {
        let c = clinic().await?;
        let family = seed_user(c.workflow.store(), "Família", "patient").await?;
        assert!(matches!(family, Principal::Restricted(_)));

        assert!(c
            .workflow
            .list_patients(&family, &ListQuery::default())
            .await?
            .is_empty());
        assert!(matches!(
            c.workflow.get_patient(&family, c.patient).await,
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(
            c.workflow.create_patient(&family, patient_input("Eva")).await,
            Err(WorkflowError::Forbidden(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn list_filters_are_and_ed_with_visibility() -> Result<()> {
        let c = clinic().await?;
        let second = c
            .workflow
            .create_patient(&c.therapist, patient_input("Elisa"))
            .await?
            .id;
        let draft = c
            .workflow
            .create_plan(&c.therapist, plan_input(c.patient, c.supervisor.id(), vec![goal("Meta")]))
            .await?;
        c.workflow
            .create_plan(&c.therapist, plan_input(second, c.supervisor.id(), vec![goal("Meta")]))
            .await?;
        c.workflow
            .transition_plan(&c.therapist, draft.plan.id, ApprovalStatus::PendingApproval, None)
            .await?;

        let pending = ListQuery {
            patient: None,
            status: Some("pending_approval".to_string()),
        };
        let listed = c.workflow.list_plans(&c.supervisor, &pending).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].plan.id, draft.plan.id);

        let by_patient = ListQuery {
            patient: Some(second),
            status: None,
        };
        assert_eq!(c.workflow.list_plans(&c.therapist, &by_patient).await?.len(), 1);
        assert!(c
            .workflow
            .list_plans(&c.other_therapist, &by_patient)
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn plan_requires_a_supervisor_reviewer() -> Result<()> {
        let c = clinic().await?;
        let result = c
            .workflow
            .create_plan(
                &c.therapist,
                plan_input(c.patient, c.other_therapist.id(), vec![goal("Meta")]),
            )
            .await;
        match result {
            Err(WorkflowError::ValidationFailed(fields)) => assert_eq!(fields[0].field, "supervisor"),
            other => panic!("esperado ValidationFailed, obtido {:?}", other.map(|v| v.plan.id)),
        }
        Ok(())
    }

    #[tokio::test]
    async fn draft_without_goals_cannot_be_submitted() -> Result<()> {
        let c = clinic().await?;
        let plan = c
            .workflow
            .create_plan(&c.therapist, plan_input(c.patient, c.supervisor.id(), vec![]))
            .await?;

        let result = c
            .workflow
            .transition_plan(&c.therapist, plan.plan.id, ApprovalStatus::PendingApproval, None)
            .await;
        match result {
            Err(WorkflowError::ValidationFailed(fields)) => assert_eq!(fields[0].field, "goals"),
            other => panic!("esperado ValidationFailed, obtido {:?}", other.map(|v| v.plan.status)),
        }

        let stored = c.workflow.get_plan(&c.therapist, plan.plan.id).await?;
        assert_eq!(stored.plan.status, ApprovalStatus::Draft);
        Ok(())
    }

    #[tokio::test]
    async fn plan_review_round_trip() -> Result<()> {
        let c = clinic().await?;
        let id = c
            .workflow
            .create_plan(
                &c.therapist,
                plan_input(c.patient, c.supervisor.id(), vec![goal("Produzir /r/")]),
            )
            .await?
            .plan
            .id;

        c.workflow
            .transition_plan(&c.therapist, id, ApprovalStatus::PendingApproval, None)
            .await?;

        // Envio pendente não pode ser editado
        assert!(matches!(
            c.workflow
                .update_plan(&c.therapist, id, UpdatePlanInput::default())
                .await,
            Err(WorkflowError::NotEditable {
                status: ApprovalStatus::PendingApproval
            })
        ));

        assert!(matches!(
            c.workflow
                .transition_plan(&c.supervisor, id, ApprovalStatus::Rejected, Some("  "))
                .await,
            Err(WorkflowError::ValidationFailed(_))
        ));

        let rejected = c
            .workflow
            .transition_plan(&c.supervisor, id, ApprovalStatus::Rejected, Some("add more detail"))
            .await?;
        assert_eq!(rejected.plan.status, ApprovalStatus::Rejected);
        assert_eq!(
            rejected.plan.supervisor_feedback.as_deref(),
            Some("add more detail")
        );

        let edited = c
            .workflow
            .update_plan(
                &c.therapist,
                id,
                UpdatePlanInput {
                    goals: Some(vec![goal("Produzir /r/"), goal("Produzir /l/")]),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(edited.plan.goals.len(), 2);
        assert_eq!(edited.plan.status, ApprovalStatus::Rejected);

        c.workflow
            .transition_plan(&c.therapist, id, ApprovalStatus::PendingApproval, None)
            .await?;
        let approved = c
            .workflow
            .transition_plan(&c.supervisor, id, ApprovalStatus::Approved, None)
            .await?;
        assert_eq!(approved.plan.status, ApprovalStatus::Approved);
        assert_eq!(approved.plan.supervisor_feedback, None);

        assert!(matches!(
            c.workflow
                .transition_plan(&c.supervisor, id, ApprovalStatus::Approved, None)
                .await,
            Err(WorkflowError::InvalidTransition {
                from: ApprovalStatus::Approved,
                to: ApprovalStatus::Approved
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn approved_plan_is_frozen() -> Result<()> {
        let c = clinic().await?;
        let id = c
            .workflow
            .create_plan(&c.therapist, plan_input(c.patient, c.supervisor.id(), vec![goal("Meta")]))
            .await?
            .plan
            .id;
        c.workflow
            .transition_plan(&c.therapist, id, ApprovalStatus::PendingApproval, None)
            .await?;
        c.workflow
            .transition_plan(&c.supervisor, id, ApprovalStatus::Approved, Some("Ok"))
            .await?;

        let update = c
            .workflow
            .update_plan(
                &c.therapist,
                id,
                UpdatePlanInput {
                    notes: Some("alteração tardia".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(update, Err(WorkflowError::NotEditable { .. })));
        assert!(matches!(
            c.workflow.delete_plan(&c.therapist, id).await,
            Err(WorkflowError::NotEditable { .. })
        ));
        assert!(matches!(
            c.workflow.delete_plan(&c.supervisor, id).await,
            Err(WorkflowError::Forbidden(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_role_is_forbidden() -> Result<()> {
        let c = clinic().await?;
        let id = c
            .workflow
            .create_plan(&c.therapist, plan_input(c.patient, c.supervisor.id(), vec![goal("Meta")]))
            .await?
            .plan
            .id;

        assert!(matches!(
            c.workflow
                .transition_plan(&c.supervisor, id, ApprovalStatus::PendingApproval, None)
                .await,
            Err(WorkflowError::Forbidden(_))
        ));
        c.workflow
            .transition_plan(&c.therapist, id, ApprovalStatus::PendingApproval, None)
            .await?;
        assert!(matches!(
            c.workflow
                .transition_plan(&c.therapist, id, ApprovalStatus::Approved, None)
                .await,
            Err(WorkflowError::Forbidden(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn stale_decision_observes_conflict() -> Result<()> {
        let c = clinic().await?;
        let id = c
            .workflow
            .create_report(&c.therapist, report_input(c.patient))
            .await?
            .report
            .id;
        c.workflow
            .transition_report(&c.therapist, id, ApprovalStatus::PendingApproval, None)
            .await?;

        // Duas decisões tomadas sobre a mesma leitura
        let snapshot = c.workflow.get_report(&c.supervisor, id).await?.report;
        let approve =
            attempt_transition(&snapshot, ApprovalStatus::Approved, &c.supervisor, None)?;
        let reject = attempt_transition(
            &snapshot,
            ApprovalStatus::Rejected,
            &c.supervisor,
            Some("Revisar metas"),
        )?;

        c.workflow
            .commit_transition(EntityClass::ProgressReport, id, &approve)
            .await?;
        assert!(matches!(
            c.workflow
                .commit_transition(EntityClass::ProgressReport, id, &reject)
                .await,
            Err(WorkflowError::Conflict)
        ));

        let stored = c.workflow.get_report(&c.therapist, id).await?.report;
        assert_eq!(stored.status, ApprovalStatus::Approved);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_review_has_a_single_winner_and_a_409_loser() -> Result<()> {
        let c = clinic().await?;
        let id = c
            .workflow
            .create_plan(&c.therapist, plan_input(c.patient, c.supervisor.id(), vec![goal("Meta")]))
            .await?
            .plan
            .id;
        c.workflow
            .transition_plan(&c.therapist, id, ApprovalStatus::PendingApproval, None)
            .await?;

        let (approve, reject) = tokio::join!(
            c.workflow
                .transition_plan(&c.supervisor, id, ApprovalStatus::Approved, None),
            c.workflow
                .transition_plan(&c.supervisor, id, ApprovalStatus::Rejected, Some("Incompleto")),
        );

        let outcomes = [approve.map(|v| v.plan.status), reject.map(|v| v.plan.status)];
        let winners: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let winner = *winners[0];

        // O perdedor que leu antes da gravação do vencedor falha no UPDATE
        // condicional (`Conflict`); o que leu depois já parte do status final
        // e esbarra na tabela de transições. Ambos respondem 409.
        for outcome in &outcomes {
            match outcome {
                Ok(_) | Err(WorkflowError::Conflict) => {}
                Err(WorkflowError::InvalidTransition { from, .. }) => assert_eq!(*from, winner),
                Err(other) => panic!("esperado Conflict, obtido {:?}", other),
            }
        }

        let stored = c.workflow.get_plan(&c.therapist, id).await?;
        assert_eq!(stored.plan.status, winner);
        Ok(())
    }

    #[tokio::test]
    async fn report_must_reference_a_plan_of_the_same_patient() -> Result<()> {
        let c = clinic().await?;
        let other_patient = c
            .workflow
            .create_patient(&c.therapist, patient_input("Fábio"))
            .await?
            .id;
        let plan = c
            .workflow
            .create_plan(
                &c.therapist,
                plan_input(other_patient, c.supervisor.id(), vec![goal("Meta")]),
            )
            .await?;

        let mut input = report_input(c.patient);
        input.therapy_plan = Some(plan.plan.id);
        match c.workflow.create_report(&c.therapist, input).await {
            Err(WorkflowError::ValidationFailed(fields)) => {
                assert_eq!(fields[0].field, "therapyPlan")
            }
            other => panic!("esperado ValidationFailed, obtido {:?}", other.map(|v| v.report.id)),
        }

        let mut input = report_input(other_patient);
        input.therapy_plan = Some(plan.plan.id);
        let report = c.workflow.create_report(&c.therapist, input).await?;
        assert_eq!(report.report.therapy_plan, Some(plan.plan.id));
        assert_eq!(report.patient_name, "Fábio");
        Ok(())
    }

    #[tokio::test]
    async fn ratings_are_owned_and_editable() -> Result<()> {
        let c = clinic().await?;
        let rating = c
            .workflow
            .create_rating(&c.therapist, rating_input(c.patient))
            .await?;
        assert_eq!(rating.rating.status, RatingStatus::Draft);

        let published = c
            .workflow
            .update_rating(
                &c.therapist,
                rating.rating.id,
                UpdateRatingInput {
                    status: Some(RatingStatus::Published),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(published.rating.status, RatingStatus::Published);
        assert_eq!(published.rating.overall_rating.score, 3);

        assert!(matches!(
            c.workflow
                .delete_rating(&c.other_therapist, rating.rating.id)
                .await,
            Err(WorkflowError::NotFound(EntityClass::ClinicalRating))
        ));
        c.workflow.delete_rating(&c.therapist, rating.rating.id).await?;
        assert!(c
            .workflow
            .list_ratings(&c.supervisor, &ListQuery::default())
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_a_field_error() -> Result<()> {
        let c = clinic().await?;
        let input = RegisterInput {
            name: "Helena".to_string(),
            email: "helena@clinica.test".to_string(),
            password: "senha-segura".to_string(),
            role: "therapist".to_string(),
            specialization: "Linguagem".to_string(),
            experience: 5,
        };
        c.workflow.register_user(&input, "hash").await?;
        match c.workflow.register_user(&input, "hash").await {
            Err(WorkflowError::ValidationFailed(fields)) => assert_eq!(fields[0].field, "email"),
            other => panic!("esperado ValidationFailed, obtido {:?}", other.map(|u| u.id)),
        }

        let supervisors = c.workflow.list_supervisors().await?;
        assert_eq!(supervisors.len(), 1);
        assert_eq!(supervisors[0].name, "Carla");
        Ok(())
    }
}
