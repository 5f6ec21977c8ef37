use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::{push_filter, Store};
use crate::access::RecordFilter;
use crate::approval::ApprovalStatus;
use crate::error::DbError;
use crate::models::{enum_column, uuid_column, Address, Gender, Patient, PatientStatus};

/// Linha de `patients` ainda com os campos clínicos criptografados
struct SealedPatient {
    patient: Patient,
    medical_history: (Vec<u8>, Vec<u8>),
    diagnosis: (Vec<u8>, Vec<u8>),
}

impl FromRow<'_, SqliteRow> for SealedPatient {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let last_session_date: Option<NaiveDate> = row.try_get("last_session_date")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(Self {
            patient: Patient {
                id: uuid_column(row, "id")?,
                name: row.try_get("name")?,
                age: row.try_get("age")?,
                gender: enum_column::<Gender>(row, "gender")?,
                contact_number: row.try_get("contact_number")?,
                email: row.try_get("email")?,
                address: row.try_get::<Json<Address>, _>("address")?.0,
                medical_history: String::new(),
                diagnosis: String::new(),
                status: enum_column::<PatientStatus>(row, "status")?,
                total_sessions: row.try_get("total_sessions")?,
                last_session_date,
                therapist: uuid_column(row, "therapist_id")?,
                created_at,
                updated_at,
            },
            medical_history: (
                row.try_get("medical_history_ciphertext")?,
                row.try_get("medical_history_nonce")?,
            ),
            diagnosis: (
                row.try_get("diagnosis_ciphertext")?,
                row.try_get("diagnosis_nonce")?,
            ),
        })
    }
}

impl Store {
    fn unseal(&self, sealed: SealedPatient) -> Result<Patient, DbError> {
        let mut patient = sealed.patient;
        patient.medical_history = self.open(sealed.medical_history.0, sealed.medical_history.1)?;
        patient.diagnosis = self.open(sealed.diagnosis.0, sealed.diagnosis.1)?;
        Ok(patient)
    }

    pub async fn list_patients(&self, filter: &RecordFilter) -> Result<Vec<Patient>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM patients WHERE 1 = 1");
        push_filter(&mut qb, filter, "");
        qb.push(" ORDER BY name");

        let rows = qb
            .build_query_as::<SealedPatient>()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = rows.len(), "Pacientes carregados");

        rows.into_iter().map(|row| self.unseal(row)).collect()
    }

    pub async fn find_patient(&self, filter: &RecordFilter) -> Result<Option<Patient>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM patients WHERE 1 = 1");
        push_filter(&mut qb, filter, "");

        qb.build_query_as::<SealedPatient>()
            .fetch_optional(&self.pool)
            .await?
            .map(|row| self.unseal(row))
            .transpose()
    }

    pub async fn insert_patient(&self, patient: &Patient) -> Result<(), DbError> {
        let history = self.seal(&patient.medical_history)?;
        let diagnosis = self.seal(&patient.diagnosis)?;

        sqlx::query(
            r#"
            INSERT INTO patients (
                id, therapist_id, name, age, gender, contact_number, email, address,
                medical_history_ciphertext, medical_history_nonce,
                diagnosis_ciphertext, diagnosis_nonce,
                status, total_sessions, last_session_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(patient.id.to_string())
        .bind(patient.therapist.to_string())
        .bind(&patient.name)
        .bind(patient.age)
        .bind(patient.gender.to_string())
        .bind(&patient.contact_number)
        .bind(&patient.email)
        .bind(Json(&patient.address))
        .bind(history.ciphertext)
        .bind(history.nonce)
        .bind(diagnosis.ciphertext)
        .bind(diagnosis.nonce)
        .bind(patient.status.to_string())
        .bind(patient.total_sessions)
        .bind(patient.last_session_date)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Regrava o paciente; `false` se ele não existe mais para o mesmo terapeuta
    pub async fn update_patient(&self, patient: &Patient) -> Result<bool, DbError> {
        let history = self.seal(&patient.medical_history)?;
        let diagnosis = self.seal(&patient.diagnosis)?;

        let result = sqlx::query(
            r#"
            UPDATE patients SET
                name = ?, age = ?, gender = ?, contact_number = ?, email = ?, address = ?,
                medical_history_ciphertext = ?, medical_history_nonce = ?,
                diagnosis_ciphertext = ?, diagnosis_nonce = ?,
                status = ?, total_sessions = ?, last_session_date = ?, updated_at = ?
            WHERE id = ? AND therapist_id = ?
            "#,
        )
        .bind(&patient.name)
        .bind(patient.age)
        .bind(patient.gender.to_string())
        .bind(&patient.contact_number)
        .bind(&patient.email)
        .bind(Json(&patient.address))
        .bind(history.ciphertext)
        .bind(history.nonce)
        .bind(diagnosis.ciphertext)
        .bind(diagnosis.nonce)
        .bind(patient.status.to_string())
        .bind(patient.total_sessions)
        .bind(patient.last_session_date)
        .bind(patient.updated_at)
        .bind(patient.id.to_string())
        .bind(patient.therapist.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Remove o paciente do filtro desde que nenhum plano ou relatório
    /// aprovado o referencie; `false` quando nada foi removido
    pub async fn delete_patient(&self, filter: &RecordFilter) -> Result<bool, DbError> {
        let approved = ApprovalStatus::Approved.as_str();
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM patients WHERE 1 = 1");
        push_filter(&mut qb, filter, "");
        qb.push(
            " AND NOT EXISTS (SELECT 1 FROM therapy_plans p \
             WHERE p.patient_id = patients.id AND p.status = ",
        )
        .push_bind(approved)
        .push(")");
        qb.push(
            " AND NOT EXISTS (SELECT 1 FROM progress_reports r \
             WHERE r.patient_id = patients.id AND r.status = ",
        )
        .push_bind(approved)
        .push(")");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
