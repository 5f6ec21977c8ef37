//! Therapy API - Serviço HTTP do fluxo clínico de fonoaudiologia
//!
//! Expõe pacientes, planos terapêuticos, relatórios de evolução e avaliações
//! clínicas sobre o [`therapy_core::Workflow`], com autenticação JWT.

use std::sync::Arc;

use axum::Router;
use therapy_core::Workflow;
use tower::limit::ConcurrencyLimitLayer;
use tower::Layer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{JwtKeys, PrincipalResolver};

pub mod auth;
pub mod config;
pub mod error;
mod routes;
pub mod telemetry;

/// Informações geradas em tempo de build
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Estado compartilhado pelos handlers
#[derive(Clone)]
pub struct AppState {
    pub workflow: Workflow,
    pub resolver: Arc<dyn PrincipalResolver>,
    pub tokens: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(workflow: Workflow, keys: JwtKeys) -> Self {
        let keys = Arc::new(keys);
        Self {
            workflow,
            resolver: keys.clone(),
            tokens: keys,
        }
    }

    /// Estado com um resolvedor de identidade próprio
    pub fn with_resolver(
        workflow: Workflow,
        resolver: Arc<dyn PrincipalResolver>,
        keys: JwtKeys,
    ) -> Self {
        Self {
            workflow,
            resolver,
            tokens: Arc::new(keys),
        }
    }
}

/// Monta o roteador com as camadas de CORS, compressão e trace
///
/// O limite de concorrência envolve o roteador inteiro: `Router::layer`
/// aplicaria uma instância (e um semáforo) por rota.
pub fn build_router(state: AppState, max_concurrent_requests: usize) -> Router {
    let app = routes::router()
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());
    Router::new().fallback_service(ConcurrencyLimitLayer::new(max_concurrent_requests).layer(app))
}
