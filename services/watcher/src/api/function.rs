//! Function resource endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use seqclock_request::{Request, ResetRequest};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::runtime::{ROLE_POD, ROLE_USER_ACTION};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/function/{name}", get(get_container))
        .route("/function/requestResources", post(request_resources))
        .route("/function/resetRequest", post(reset_request))
        .route("/registry", get(export_registry))
}

#[derive(Debug, Deserialize)]
struct ContainerQuery {
    #[serde(default, rename = "type")]
    role: Option<String>,
}

/// Debug lookup of the container serving a function.
async fn get_container(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ContainerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let role = query.role.unwrap_or_else(|| ROLE_USER_ACTION.to_string());
    if role != ROLE_USER_ACTION && role != ROLE_POD {
        return Err(ApiError::bad_request(
            "unsupported_pod_type",
            "Not supported pod type.",
        ));
    }

    let container = state
        .resolver()
        .runtime()
        .find_container(&name, &role)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, function = %name, "Container lookup failed");
            ApiError::internal("runtime_error", e.to_string())
        })?
        .ok_or_else(|| {
            ApiError::not_found("container_not_found", format!("no container for '{name}'"))
        })?;

    Ok(Json(serde_json::json!({
        "ID": container.short_id(),
        "Image": container.image,
        "Command": container.command,
        "Created": container.created,
        "Labels": container.labels,
        "State": container.state,
        "Status": container.status,
    })))
}

async fn request_resources(
    State(state): State<AppState>,
    payload: Result<Json<Request>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    state.resolver().update_registry(&request).await.map_err(|e| {
        tracing::debug!(error = %e, request_id = request.id, "Request not admitted");
        ApiError::from(e)
    })?;
    Ok((StatusCode::OK, "ok"))
}

async fn reset_request(
    State(state): State<AppState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(reset) = payload?;
    state.resolver().remove_from_registry(&reset).await?;
    Ok((StatusCode::OK, "ok"))
}

async fn export_registry(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.resolver().export_registry().await)
}
