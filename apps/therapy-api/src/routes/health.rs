use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use crate::{built_info, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query("SELECT 1")
        .execute(state.workflow.store().pool())
        .await
    {
        Ok(_) => "ok",
        Err(e) => {
            warn!(error = %e, "Banco de dados indisponível");
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
        "version": built_info::PKG_VERSION,
        "rustc": built_info::RUSTC_VERSION,
        "profile": built_info::PROFILE,
        "target": built_info::TARGET,
    }))
}
