use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::{push_filter, Store};
use crate::access::RecordFilter;
use crate::approval::ApprovalStatus;
use crate::error::DbError;
use crate::models::{TherapyPlan, TherapyPlanView};

const PLAN_VIEW_SELECT: &str = r#"
    SELECT p.*,
           COALESCE(pt.name, '') AS patient_name,
           COALESCE(th.name, '') AS therapist_name,
           COALESCE(sv.name, '') AS supervisor_name
    FROM therapy_plans p
    LEFT JOIN patients pt ON pt.id = p.patient_id
    LEFT JOIN users th ON th.id = p.therapist_id
    LEFT JOIN users sv ON sv.id = p.supervisor_id
    WHERE 1 = 1
"#;

impl Store {
    pub async fn list_plans(&self, filter: &RecordFilter) -> Result<Vec<TherapyPlanView>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(PLAN_VIEW_SELECT);
        push_filter(&mut qb, filter, "p");
        qb.push(" ORDER BY p.created_at DESC");

        let plans = qb
            .build_query_as::<TherapyPlanView>()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = plans.len(), "Planos carregados");
        Ok(plans)
    }

    pub async fn find_plan(&self, filter: &RecordFilter) -> Result<Option<TherapyPlanView>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(PLAN_VIEW_SELECT);
        push_filter(&mut qb, filter, "p");

        Ok(qb
            .build_query_as::<TherapyPlanView>()
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn insert_plan(&self, plan: &TherapyPlan) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO therapy_plans (
                id, patient_id, therapist_id, supervisor_id, goals, activities, status,
                start_date, end_date, notes, supervisor_feedback, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan.id.to_string())
        .bind(plan.patient.to_string())
        .bind(plan.therapist.to_string())
        .bind(plan.supervisor.to_string())
        .bind(Json(&plan.goals))
        .bind(Json(&plan.activities))
        .bind(plan.status.as_str())
        .bind(plan.start_date)
        .bind(plan.end_date)
        .bind(&plan.notes)
        .bind(&plan.supervisor_feedback)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Regrava o conteúdo do plano se o status ainda for `expected`
    ///
    /// O status em si só muda por [`Store::compare_and_set_status`].
    pub async fn update_plan_content(
        &self,
        plan: &TherapyPlan,
        expected: ApprovalStatus,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE therapy_plans SET
                supervisor_id = ?, goals = ?, activities = ?, start_date = ?, end_date = ?,
                notes = ?, updated_at = ?
            WHERE id = ? AND therapist_id = ? AND status = ?
            "#,
        )
        .bind(plan.supervisor.to_string())
        .bind(Json(&plan.goals))
        .bind(Json(&plan.activities))
        .bind(plan.start_date)
        .bind(plan.end_date)
        .bind(&plan.notes)
        .bind(plan.updated_at)
        .bind(plan.id.to_string())
        .bind(plan.therapist.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
