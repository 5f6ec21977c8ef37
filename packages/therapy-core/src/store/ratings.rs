use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::{push_filter, Store};
use crate::access::RecordFilter;
use crate::error::DbError;
use crate::models::{ClinicalRating, ClinicalRatingView};

const RATING_VIEW_SELECT: &str = r#"
    SELECT c.*, COALESCE(pt.name, '') AS patient_name
    FROM clinical_ratings c
    LEFT JOIN patients pt ON pt.id = c.patient_id
    WHERE 1 = 1
"#;

impl Store {
    pub async fn list_ratings(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ClinicalRatingView>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(RATING_VIEW_SELECT);
        push_filter(&mut qb, filter, "c");
        qb.push(" ORDER BY c.period_end DESC");

        let ratings = qb
            .build_query_as::<ClinicalRatingView>()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = ratings.len(), "Avaliações carregadas");
        Ok(ratings)
    }

    pub async fn find_rating(
        &self,
        filter: &RecordFilter,
    ) -> Result<Option<ClinicalRatingView>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(RATING_VIEW_SELECT);
        push_filter(&mut qb, filter, "c");

        Ok(qb
            .build_query_as::<ClinicalRatingView>()
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn insert_rating(&self, rating: &ClinicalRating) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO clinical_ratings (
                id, patient_id, therapist_id, period_start, period_end, overall_score,
                overall_comments, domain_ratings, recommendations, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rating.id.to_string())
        .bind(rating.patient.to_string())
        .bind(rating.therapist.to_string())
        .bind(rating.evaluation_period.start_date)
        .bind(rating.evaluation_period.end_date)
        .bind(rating.overall_rating.score)
        .bind(&rating.overall_rating.comments)
        .bind(Json(&rating.domain_ratings))
        .bind(Json(&rating.recommendations))
        .bind(rating.status.to_string())
        .bind(rating.created_at)
        .bind(rating.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_rating(&self, rating: &ClinicalRating) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE clinical_ratings SET
                period_start = ?, period_end = ?, overall_score = ?, overall_comments = ?,
                domain_ratings = ?, recommendations = ?, status = ?, updated_at = ?
            WHERE id = ? AND therapist_id = ?
            "#,
        )
        .bind(rating.evaluation_period.start_date)
        .bind(rating.evaluation_period.end_date)
        .bind(rating.overall_rating.score)
        .bind(&rating.overall_rating.comments)
        .bind(Json(&rating.domain_ratings))
        .bind(Json(&rating.recommendations))
        .bind(rating.status.to_string())
        .bind(rating.updated_at)
        .bind(rating.id.to_string())
        .bind(rating.therapist.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
