use axum::response::IntoResponse;
use http::{header, StatusCode};

use crate::app_state::AppState;

/// `GET /metrics` (`spec.md` §4.10, §4.11): the local Prometheus-text
/// rendering of the counters accumulated by [`crate::observability`].
pub async fn handle(state: &AppState) -> axum::response::Response {
    let body = state.observability().render_prometheus();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
