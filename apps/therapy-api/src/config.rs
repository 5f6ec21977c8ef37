//! Configuração do serviço a partir de variáveis de ambiente

use std::env;
use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use therapy_core::DbConfig;

/// Formato de saída dos logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db: DbConfig,
    pub jwt_secret: String,
    /// Validade dos tokens emitidos
    pub jwt_ttl_hours: i64,
    pub log_format: LogFormat,
    pub max_concurrent_requests: usize,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(anyhow!("Variável de ambiente obrigatória ausente: {}", name)),
    }
}

fn parsed<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .parse()
        .with_context(|| format!("Valor inválido em {}", name))
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = DbConfig::default();

        let log_format = match var_or("LOG_FORMAT", "pretty").as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr: parsed("BIND_ADDR", "0.0.0.0:5000")?,
            db: DbConfig {
                db_path: var_or("DATABASE_PATH", &defaults.db_path),
                key_phrase: required("DB_KEY_PHRASE")?,
                max_connections: parsed("DB_MAX_CONNECTIONS", &defaults.max_connections.to_string())?,
                trace_level: parsed("DB_TRACE_LEVEL", "0")?,
            },
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_hours: parsed("JWT_TTL_HOURS", "168")?,
            log_format,
            max_concurrent_requests: parsed("MAX_CONCURRENT_REQUESTS", "256")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_required_variable_is_an_error() {
        env::set_var("THERAPY_TEST_BLANK_SECRET", "   ");
        assert!(required("THERAPY_TEST_BLANK_SECRET").is_err());
        assert!(required("THERAPY_TEST_NEVER_SET").is_err());
    }

    #[test]
    fn parsed_falls_back_to_default_and_reports_bad_values() {
        let port: u16 = parsed("THERAPY_TEST_UNSET_PORT", "5000").unwrap();
        assert_eq!(port, 5000);

        env::set_var("THERAPY_TEST_BAD_TTL", "uma semana");
        let err = parsed::<i64>("THERAPY_TEST_BAD_TTL", "168").unwrap_err();
        assert!(err.to_string().contains("THERAPY_TEST_BAD_TTL"));
    }
}
