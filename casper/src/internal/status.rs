use axum::{response::IntoResponse, Json};
use http::StatusCode;
use serde::Serialize;

use crate::app_state::AppState;

use super::query_param;

#[derive(Serialize)]
struct StatusResponse {
    worker_id: String,
    configs_loaded: bool,
    destinations_missing_smartstack: Vec<String>,
    backend_healthy: Option<bool>,
}

/// `GET /status?check_backend=true` (`spec.md` §4.10): reports whether
/// the required top-level artifacts (`casper.internal.yaml`, the
/// SmartStack registry) loaded, which known destinations have no
/// SmartStack entry, and (only when asked) whether the storage backend
/// answers. Returns 500 if any required artifact is missing, if any
/// known destination lacks a SmartStack entry, or if the backend health
/// check was requested and failed.
pub async fn handle(state: &AppState, query: Option<&str>) -> axum::response::Response {
    let smartstack = state.config().smartstack().await;
    let known: Vec<String> = state
        .config()
        .known_destinations()
        .await
        .into_iter()
        .map(|(destination, _)| destination)
        .collect();
    let configs_loaded = state.config().required_artifacts_present().await;
    let destinations_missing_smartstack = smartstack.missing(&known);

    let check_backend = query_param(query, "check_backend").as_deref() == Some("true");
    let backend_healthy = if check_backend {
        Some(state.storage().health_check().await)
    } else {
        None
    };

    let body = StatusResponse {
        worker_id: state.worker_id().to_string(),
        configs_loaded,
        destinations_missing_smartstack: destinations_missing_smartstack.clone(),
        backend_healthy,
    };

    let status = if backend_healthy == Some(false)
        || !configs_loaded
        || !destinations_missing_smartstack.is_empty()
    {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    (status, Json(body)).into_response()
}
