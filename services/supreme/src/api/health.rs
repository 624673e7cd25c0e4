//! Liveness endpoint.

use axum::{extract::State, routing::get, Router};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/check", get(check))
}

async fn check(State(state): State<AppState>) -> String {
    format!(
        "Hello from supreme, routing across {} watcher nodes!",
        state.coordinator().node_count()
    )
}
