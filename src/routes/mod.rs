//! HTTP route registration.

use axum::Router;

use crate::AppState;

pub mod health;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
}
