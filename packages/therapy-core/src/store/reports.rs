use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::{push_filter, Store};
use crate::access::RecordFilter;
use crate::approval::ApprovalStatus;
use crate::error::DbError;
use crate::models::{ProgressReport, ProgressReportView};

const REPORT_VIEW_SELECT: &str = r#"
    SELECT r.*,
           COALESCE(pt.name, '') AS patient_name,
           COALESCE(th.name, '') AS therapist_name
    FROM progress_reports r
    LEFT JOIN patients pt ON pt.id = r.patient_id
    LEFT JOIN users th ON th.id = r.therapist_id
    WHERE 1 = 1
"#;

impl Store {
    pub async fn list_reports(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ProgressReportView>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(REPORT_VIEW_SELECT);
        push_filter(&mut qb, filter, "r");
        qb.push(" ORDER BY r.created_at DESC");

        let reports = qb
            .build_query_as::<ProgressReportView>()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = reports.len(), "Relatórios carregados");
        Ok(reports)
    }

    pub async fn find_report(
        &self,
        filter: &RecordFilter,
    ) -> Result<Option<ProgressReportView>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(REPORT_VIEW_SELECT);
        push_filter(&mut qb, filter, "r");

        Ok(qb
            .build_query_as::<ProgressReportView>()
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn insert_report(&self, report: &ProgressReport) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO progress_reports (
                id, patient_id, therapist_id, therapy_plan_id, session_details, progress,
                next_steps, status, supervisor_feedback, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.id.to_string())
        .bind(report.patient.to_string())
        .bind(report.therapist.to_string())
        .bind(report.therapy_plan.map(|id| id.to_string()))
        .bind(Json(&report.session_details))
        .bind(Json(&report.progress))
        .bind(Json(&report.next_steps))
        .bind(report.status.as_str())
        .bind(&report.supervisor_feedback)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_report_content(
        &self,
        report: &ProgressReport,
        expected: ApprovalStatus,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE progress_reports SET
                therapy_plan_id = ?, session_details = ?, progress = ?, next_steps = ?,
                updated_at = ?
            WHERE id = ? AND therapist_id = ? AND status = ?
            "#,
        )
        .bind(report.therapy_plan.map(|id| id.to_string()))
        .bind(Json(&report.session_details))
        .bind(Json(&report.progress))
        .bind(Json(&report.next_steps))
        .bind(report.updated_at)
        .bind(report.id.to_string())
        .bind(report.therapist.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
