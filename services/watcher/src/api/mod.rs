//! HTTP API handlers and routing.

pub mod error;
mod function;
mod health;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the watcher router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(function::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
