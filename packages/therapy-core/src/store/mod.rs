//! Persistência das entidades clínicas em SQLite
//!
//! Toda consulta recebe um [`RecordFilter`] já calculado; este módulo apenas
//! o traduz para SQL. Nenhuma decisão de autorização é tomada aqui.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::access::{EntityClass, RecordFilter, Scope};
use crate::approval::{FeedbackChange, TransitionOutcome};
use crate::crypto::{self, EncryptionKey};
use crate::error::DbError;

mod patients;
mod plans;
mod ratings;
mod reports;
mod users;

/// Acesso ao banco de dados com a chave de criptografia de campos clínicos
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    key: Arc<EncryptionKey>,
}

impl Store {
    pub fn new(pool: SqlitePool, key: EncryptionKey) -> Self {
        Self {
            pool,
            key: Arc::new(key),
        }
    }

    /// Deriva a chave de `key_phrase` com o salt persistido em `key_material`
    ///
    /// O salt é criado na primeira abertura do banco.
    pub async fn with_key_phrase(pool: SqlitePool, key_phrase: &str) -> Result<Self, DbError> {
        sqlx::query("INSERT OR IGNORE INTO key_material (id, kdf_salt) VALUES (1, ?)")
            .bind(crypto::generate_salt().to_vec())
            .execute(&pool)
            .await?;
        let salt: Vec<u8> = sqlx::query_scalar("SELECT kdf_salt FROM key_material WHERE id = 1")
            .fetch_one(&pool)
            .await?;

        let key = EncryptionKey::derive(key_phrase, &salt)
            .map_err(|e| DbError::CryptoError(e.to_string()))?;
        Ok(Self::new(pool, key))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn seal(&self, text: &str) -> Result<crypto::EncryptedData, DbError> {
        crypto::encrypt_text(text, &self.key).map_err(|e| DbError::CryptoError(e.to_string()))
    }

    fn open(&self, ciphertext: Vec<u8>, nonce: Vec<u8>) -> Result<String, DbError> {
        crypto::decrypt_text(&crypto::EncryptedData { ciphertext, nonce }, &self.key)
            .map_err(|e| DbError::CryptoError(e.to_string()))
    }

    /// Indica se algum registro casa com o filtro
    pub async fn exists(&self, filter: &RecordFilter) -> Result<bool, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(*) FROM {} WHERE 1 = 1",
            filter.class.table()
        ));
        push_filter(&mut qb, filter, "");
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    /// Remove o registro que casa com o filtro; `false` quando nada casou
    pub async fn delete(&self, filter: &RecordFilter) -> Result<bool, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "DELETE FROM {} WHERE 1 = 1",
            filter.class.table()
        ));
        push_filter(&mut qb, filter, "");
        debug!(table = filter.class.table(), "Removendo registro");
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Grava o resultado de uma transição condicionado ao status lido
    ///
    /// Devolve `false` quando outro pedido alterou o status nesse meio tempo.
    pub async fn compare_and_set_status(
        &self,
        class: EntityClass,
        id: Uuid,
        outcome: &TransitionOutcome,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        if !matches!(class, EntityClass::TherapyPlan | EntityClass::ProgressReport) {
            return Err(DbError::InternalError(format!(
                "{} não possui fluxo de aprovação",
                class
            )));
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET status = ", class.table()));
        qb.push_bind(outcome.status.as_str());
        if let FeedbackChange::Set(feedback) = &outcome.feedback {
            qb.push(", supervisor_feedback = ").push_bind(feedback.clone());
        }
        qb.push(", updated_at = ").push_bind(now);
        qb.push(" WHERE id = ").push_bind(id.to_string());
        qb.push(" AND status = ").push_bind(outcome.from.as_str());

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}

fn column(alias: &str, name: &str) -> String {
    if alias.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", alias, name)
    }
}

/// Acrescenta as condições do filtro (todas combinadas por AND)
///
/// A consulta já deve conter uma cláusula `WHERE`.
pub(crate) fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &RecordFilter, alias: &str) {
    match filter.scope {
        Scope::Everything => {}
        Scope::OwnedBy(owner) => {
            qb.push(format!(" AND {} = ", column(alias, "therapist_id")))
                .push_bind(owner.to_string());
        }
        Scope::Nothing => {
            qb.push(" AND 0");
        }
    }
    if let Some(id) = filter.id {
        qb.push(format!(" AND {} = ", column(alias, "id")))
            .push_bind(id.to_string());
    }
    if let Some(patient) = filter.patient {
        let patient_column = match filter.class {
            EntityClass::Patient => "id",
            _ => "patient_id",
        };
        qb.push(format!(" AND {} = ", column(alias, patient_column)))
            .push_bind(patient.to_string());
    }
    if let Some(status) = &filter.status {
        qb.push(format!(" AND {} = ", column(alias, "status")))
            .push_bind(status.clone());
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{compute_filter, Principal};

    fn sql(filter: &RecordFilter, alias: &str) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM t WHERE 1 = 1");
        push_filter(&mut qb, filter, alias);
        qb.sql().to_string()
    }

    #[test]
    fn owner_scope_becomes_a_therapist_condition() {
        let filter = compute_filter(&Principal::Therapist(Uuid::new_v4()), EntityClass::TherapyPlan)
            .with_id(Uuid::new_v4())
            .with_patient(Some(Uuid::new_v4()))
            .with_status(Some("draft".to_string()));
        assert_eq!(
            sql(&filter, "p"),
            "SELECT * FROM t WHERE 1 = 1 AND p.therapist_id = ? AND p.id = ? \
             AND p.patient_id = ? AND p.status = ?"
        );
    }

    #[test]
    fn patient_filter_targets_the_patient_id_itself() {
        let filter = RecordFilter::all(EntityClass::Patient).with_patient(Some(Uuid::new_v4()));
        assert_eq!(sql(&filter, ""), "SELECT * FROM t WHERE 1 = 1 AND id = ?");
    }

    #[test]
    fn unscoped_and_denied_filters() {
        let everything = compute_filter(&Principal::Supervisor(Uuid::new_v4()), EntityClass::Patient);
        assert_eq!(sql(&everything, ""), "SELECT * FROM t WHERE 1 = 1");

        let denied = compute_filter(&Principal::Restricted(Uuid::new_v4()), EntityClass::Patient)
            .with_id(Uuid::new_v4());
        assert_eq!(sql(&denied, ""), "SELECT * FROM t WHERE 1 = 1 AND 0 AND id = ?");
    }
}
