//! Sistema de migrações para banco de dados
//!
//! Migrações sequenciais controladas por `PRAGMA user_version`, cada uma
//! aplicada em sua própria transação.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_initial_schema.sql
    r#"
    -- Usuários (terapeutas, supervisores e demais contas)
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        specialization TEXT NOT NULL,
        experience INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Pacientes com histórico e diagnóstico criptografados
    CREATE TABLE IF NOT EXISTS patients (
        id TEXT PRIMARY KEY NOT NULL,
        therapist_id TEXT NOT NULL,
        name TEXT NOT NULL,
        age INTEGER NOT NULL,
        gender TEXT NOT NULL CHECK (gender IN ('male', 'female', 'other')),
        contact_number TEXT NOT NULL,
        email TEXT,
        address TEXT NOT NULL, -- JSON
        medical_history_ciphertext BLOB NOT NULL,
        medical_history_nonce BLOB NOT NULL,
        diagnosis_ciphertext BLOB NOT NULL,
        diagnosis_nonce BLOB NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('active', 'completed', 'discontinued')),
        total_sessions INTEGER NOT NULL DEFAULT 0,
        last_session_date DATE,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (therapist_id) REFERENCES users (id)
    );

    -- Planos terapêuticos
    CREATE TABLE IF NOT EXISTS therapy_plans (
        id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT NOT NULL,
        therapist_id TEXT NOT NULL,
        supervisor_id TEXT NOT NULL,
        goals TEXT NOT NULL, -- JSON
        activities TEXT NOT NULL, -- JSON
        status TEXT NOT NULL CHECK (status IN ('draft', 'pending_approval', 'approved', 'rejected')),
        start_date DATE NOT NULL,
        end_date DATE NOT NULL,
        notes TEXT,
        supervisor_feedback TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (patient_id) REFERENCES patients (id) ON DELETE CASCADE,
        FOREIGN KEY (therapist_id) REFERENCES users (id),
        FOREIGN KEY (supervisor_id) REFERENCES users (id)
    );

    -- Relatórios de evolução
    CREATE TABLE IF NOT EXISTS progress_reports (
        id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT NOT NULL,
        therapist_id TEXT NOT NULL,
        therapy_plan_id TEXT,
        session_details TEXT NOT NULL, -- JSON
        progress TEXT NOT NULL, -- JSON
        next_steps TEXT NOT NULL, -- JSON
        status TEXT NOT NULL CHECK (status IN ('draft', 'pending_approval', 'approved', 'rejected')),
        supervisor_feedback TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (patient_id) REFERENCES patients (id) ON DELETE CASCADE,
        FOREIGN KEY (therapist_id) REFERENCES users (id),
        FOREIGN KEY (therapy_plan_id) REFERENCES therapy_plans (id) ON DELETE SET NULL
    );

    -- Avaliações clínicas
    CREATE TABLE IF NOT EXISTS clinical_ratings (
        id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT NOT NULL,
        therapist_id TEXT NOT NULL,
        period_start DATE NOT NULL,
        period_end DATE NOT NULL,
        overall_score INTEGER NOT NULL CHECK (overall_score BETWEEN 1 AND 5),
        overall_comments TEXT,
        domain_ratings TEXT NOT NULL, -- JSON
        recommendations TEXT NOT NULL, -- JSON
        status TEXT NOT NULL CHECK (status IN ('draft', 'published', 'archived')),
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (patient_id) REFERENCES patients (id) ON DELETE CASCADE,
        FOREIGN KEY (therapist_id) REFERENCES users (id)
    );

    -- Índices para otimização
    CREATE INDEX IF NOT EXISTS idx_users_role ON users (role);
    CREATE INDEX IF NOT EXISTS idx_patients_therapist_id ON patients (therapist_id);
    CREATE INDEX IF NOT EXISTS idx_therapy_plans_therapist_id ON therapy_plans (therapist_id);
    CREATE INDEX IF NOT EXISTS idx_therapy_plans_patient_id ON therapy_plans (patient_id);
    CREATE INDEX IF NOT EXISTS idx_therapy_plans_status ON therapy_plans (status);
    CREATE INDEX IF NOT EXISTS idx_progress_reports_therapist_id ON progress_reports (therapist_id);
    CREATE INDEX IF NOT EXISTS idx_progress_reports_patient_id ON progress_reports (patient_id);
    CREATE INDEX IF NOT EXISTS idx_progress_reports_status ON progress_reports (status);
    CREATE INDEX IF NOT EXISTS idx_clinical_ratings_therapist_id ON clinical_ratings (therapist_id);
    CREATE INDEX IF NOT EXISTS idx_clinical_ratings_patient_id ON clinical_ratings (patient_id);
    "#,
    // 002_key_material.sql
    r#"
    -- Salt da derivação da chave de criptografia (linha única)
    CREATE TABLE IF NOT EXISTS key_material (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        kdf_salt BLOB NOT NULL,
        key_version INTEGER NOT NULL DEFAULT 1
    );
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!("Erro ao obter versão do banco: {}", e);
            e
        })
        .context("Falha ao ler a versão do esquema")?;

    info!("Versão atual do banco: {}", version);

    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        let mut transaction = pool
            .begin()
            .await
            .with_context(|| format!("Falha ao iniciar transação para migração {}", migration_version))?;

        sqlx::query(migration_sql)
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Falha ao executar migração {}", migration_version))?;

        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Falha ao atualizar versão para {}", migration_version))?;

        transaction
            .commit()
            .await
            .with_context(|| format!("Falha ao confirmar transação para migração {}", migration_version))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migrations.db");
        let conn_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(conn_options).await?;

        run_migrations(&pool).await?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;

        assert_eq!(version, MIGRATIONS.len() as i64);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await?;

        for expected in [
            "users",
            "patients",
            "therapy_plans",
            "progress_reports",
            "clinical_ratings",
            "key_material",
        ] {
            assert!(tables.contains(&expected.to_string()), "tabela ausente: {}", expected);
        }

        // Reaplicar não deve alterar nada
        run_migrations(&pool).await?;

        Ok(())
    }
}
