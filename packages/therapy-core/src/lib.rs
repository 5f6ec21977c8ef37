//! Therapy Core - Núcleo do fluxo clínico de fonoaudiologia
//!
//! Esta biblioteca fornece:
//! - Modelos de pacientes, planos terapêuticos, relatórios e avaliações
//! - Filtro de visibilidade por papel e máquina de estados de aprovação
//! - Orquestrador das operações de cada entidade
//! - Persistência SQLite com migrações e criptografia de campos clínicos

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub mod access;
pub mod approval;
pub mod crypto;
pub mod error;
pub mod inputs;
pub mod migrations;
pub mod models;
pub mod store;
pub mod workflow;

pub use access::{compute_filter, EntityClass, Principal, RecordFilter, Role};
pub use approval::{attempt_transition, ApprovalStatus};
pub use error::{DbError, FieldError, WorkflowError, WorkflowResult};
pub use store::Store;
pub use workflow::Workflow;

/// Configuração da conexão com o banco de dados
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Frase-senha da qual é derivada a chave dos campos clínicos
    pub key_phrase: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
    /// Nível de trace do SQL (0-3)
    pub trace_level: u8,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_path: "data/therapy.db".to_string(),
            key_phrase: String::new(),
            max_connections: 5,
            trace_level: 0,
        }
    }
}

/// Inicializa o pool SQLite e aplica as migrações pendentes
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .context("Falha ao criar diretório para banco de dados")?;
        }
    }

    let mut connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .pragma("synchronous", "NORMAL");

    if config.trace_level == 0 {
        use sqlx::ConnectOptions;
        connection_options = connection_options.disable_statement_logging();
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .context("Falha ao conectar ao banco de dados SQLite")?;

    migrations::run_migrations(&pool)
        .await
        .context("Falha ao aplicar migrações")?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}

/// Abre o banco e prepara a chave de criptografia dos campos clínicos
pub async fn open_store(config: &DbConfig) -> Result<Store> {
    let pool = init_db_pool(config).await?;
    Store::with_key_phrase(pool, &config.key_phrase)
        .await
        .context("Falha ao preparar a chave de criptografia")
}

/// Utilitários para testes com banco temporário
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use anyhow::Result;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    use crate::access::{Principal, Role};
    use crate::models::User;
    use crate::{open_store, DbConfig, Store};

    /// Store sobre um arquivo temporário, removido quando o valor é descartado
    pub struct TestStore {
        pub store: Store,
        pub config: DbConfig,
        _dir: TempDir,
    }

    pub async fn temp_store() -> Result<TestStore> {
        let dir = tempfile::tempdir()?;
        let config = DbConfig {
            db_path: dir.path().join("therapy.db").display().to_string(),
            key_phrase: "frase-de-teste".to_string(),
            max_connections: 2,
            trace_level: 0,
        };
        let store = open_store(&config).await?;
        Ok(TestStore {
            store,
            config,
            _dir: dir,
        })
    }

    /// Cadastra um usuário com o papel informado e devolve seu principal
    pub async fn seed_user(store: &Store, name: &str, role: &str) -> Result<Principal> {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@clinica.test", Uuid::new_v4().simple()),
            role: role.to_string(),
            specialization: "Fonoaudiologia".to_string(),
            experience: 3,
            created_at: Utc::now(),
        };
        store.insert_user(&user, "hash-de-teste").await?;
        Ok(Principal::from_role_name(user.id, role))
    }

    pub async fn seed_therapist(store: &Store, name: &str) -> Result<Principal> {
        seed_user(store, name, &Role::Therapist.to_string()).await
    }

    pub async fn seed_supervisor(store: &Store, name: &str) -> Result<Principal> {
        seed_user(store, name, &Role::Supervisor.to_string()).await
    }
}
