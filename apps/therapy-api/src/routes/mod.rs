use axum::Router;

use crate::AppState;

mod auth;
mod health;
mod patients;
mod plans;
mod ratings;
mod reports;
mod users;

/// Todas as rotas da API sob `/api`
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(health::router())
        .merge(users::router())
        .merge(patients::router())
        .merge(plans::router())
        .merge(reports::router())
        .merge(ratings::router())
}
