//! Liveness endpoint for load balancers.

use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/_health", get(health))
}

async fn health() -> &'static str {
    "OK"
}
