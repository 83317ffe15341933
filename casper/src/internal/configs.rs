use axum::{response::IntoResponse, Json};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
struct ConfigsResponse {
    worker_id: String,
    destinations: Vec<DestinationEntry>,
}

#[derive(Serialize)]
struct DestinationEntry {
    destination: String,
    mtime: Option<String>,
}

/// `GET /configs` (`spec.md` §4.10): a JSON dump of every destination
/// config loaded so far, each with the modification time used to detect
/// staleness, plus the worker's own identifier.
pub async fn handle(state: &AppState) -> axum::response::Response {
    let destinations = state
        .config()
        .known_destinations()
        .await
        .into_iter()
        .map(|(destination, mtime)| DestinationEntry {
            destination,
            mtime: mtime.map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339()),
        })
        .collect();

    Json(ConfigsResponse {
        worker_id: state.worker_id().to_string(),
        destinations,
    })
    .into_response()
}
