use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::Store;
use crate::error::DbError;
use crate::models::{User, UserCredentials};

impl Store {
    /// Grava um novo usuário; e-mail duplicado gera `ConstraintViolation`
    pub async fn insert_user(&self, user: &User, password_hash: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, specialization, experience, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(password_hash)
        .bind(&user.role)
        .bind(&user.specialization)
        .bind(user.experience)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, DbError> {
        Ok(sqlx::query_as::<_, UserCredentials>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>, DbError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Lista usuários, opcionalmente restritos a um papel
    pub async fn list_users(&self, role: Option<&str>) -> Result<Vec<User>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE 1 = 1");
        if let Some(role) = role {
            qb.push(" AND role = ").push_bind(role.to_string());
        }
        qb.push(" ORDER BY name");

        Ok(qb.build_query_as::<User>().fetch_all(&self.pool).await?)
    }

    pub async fn update_user(&self, user: &User) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE users SET name = ?, email = ?, specialization = ?, experience = ? WHERE id = ?",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.specialization)
        .bind(user.experience)
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
