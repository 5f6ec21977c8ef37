use anyhow::{Context, Result};
use therapy_api::auth::JwtKeys;
use therapy_api::config::AppConfig;
use therapy_api::{build_router, built_info, telemetry, AppState};
use therapy_core::{open_store, Workflow};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    telemetry::init_tracing(config.log_format);

    info!(
        version = built_info::PKG_VERSION,
        "Iniciando serviço do fluxo clínico"
    );

    let store = open_store(&config.db)
        .await
        .context("Falha ao abrir o banco de dados")?;
    let state = AppState::new(
        Workflow::new(store),
        JwtKeys::new(&config.jwt_secret, config.jwt_ttl_hours),
    );
    let app = build_router(state, config.max_concurrent_requests);

    info!(addr = %config.bind_addr, "Servidor HTTP escutando");
    axum::Server::try_bind(&config.bind_addr)
        .with_context(|| format!("Falha ao escutar em {}", config.bind_addr))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Erro no servidor HTTP")?;

    info!("Servidor encerrado");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
