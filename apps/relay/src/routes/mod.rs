pub mod health;

use axum::Router;

use crate::AppState;

pub fn router(gateway_path: &str) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router(gateway_path))
}
