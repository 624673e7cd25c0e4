//! Resource request endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use seqclock_request::{Request, ResetRequest};

use crate::api::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/function/requestResources", post(request_resources))
        .route("/function/resetResources", post(reset_resources))
        .route("/catalogs", get(catalogs))
}

async fn request_resources(
    State(state): State<AppState>,
    payload: Result<Json<Request>, JsonRejection>,
) -> Result<Json<ResetRequest>, ApiError> {
    let Json(request) = payload?;
    let reset = state.coordinator().request_resources(request).await?;
    Ok(Json(reset))
}

async fn reset_resources(
    State(state): State<AppState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(reset) = payload?;
    state.coordinator().reset_resources(reset).await?;
    Ok((StatusCode::OK, "ok"))
}

async fn catalogs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator().catalogs().await)
}
