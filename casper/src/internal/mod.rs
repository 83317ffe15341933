pub mod configs;
pub mod metrics;
pub mod purge;
pub mod status;

use axum::response::IntoResponse;
use http::{HeaderMap, Method, StatusCode};

use crate::app_state::AppState;

/// C10: internal endpoints, reached once [`crate::pipeline::handle`] has
/// classified a request as non-proxied (`spec.md` §4.10, §4.12).
pub async fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> axum::response::Response {
    match (method.as_str(), path) {
        ("GET", "/status") => status::handle(state, query).await,
        ("GET", "/configs") => configs::handle(state).await,
        ("DELETE", "/purge") => purge::handle(state, query).await,
        // Legacy route: the PURGE method against the root path, kept for
        // callers that predate the `/purge` query-string form.
        ("PURGE", "/") => purge::handle(state, query).await,
        ("GET", "/metrics") => metrics::handle(state).await,
        _ => {
            let _ = headers;
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

pub(crate) fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<std::borrow::Cow<'a, str>> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}
