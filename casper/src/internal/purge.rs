use axum::response::IntoResponse;
use http::StatusCode;

use crate::{app_state::AppState, cache::key::surrogate_keys, error::CasperError};

use super::query_param;

/// `DELETE /purge?namespace=…&cache_name=…&id=…` and the legacy
/// `PURGE /` (`spec.md` §4.10). Builds the narrowest surrogate key that
/// the supplied parameters describe and evicts every record indexed
/// under it.
pub async fn handle(state: &AppState, query: Option<&str>) -> axum::response::Response {
    let Some(namespace) = query_param(query, "namespace") else {
        return CasperError::ClientMalformed("missing required parameter: namespace".to_string()).into_response();
    };
    let Some(cache_name) = query_param(query, "cache_name") else {
        return CasperError::ClientMalformed("missing required parameter: cache_name".to_string()).into_response();
    };

    // An operator-supplied namespace that isn't a configured destination
    // is caller error, not a server-side config gap (`spec.md` §7
    // "ClientMalformed").
    let Ok(service_config) = state.config().get_destination(&namespace).await else {
        return CasperError::ClientMalformed(format!("unknown namespace: {namespace}")).into_response();
    };
    if !service_config.cached_endpoints.iter().any(|entry| entry.cache_name == cache_name) {
        return CasperError::ClientMalformed(format!("unknown cache_name: {cache_name}")).into_response();
    }

    let id = query_param(query, "id");
    let keys = surrogate_keys(&namespace, &cache_name, id.as_deref());
    // `surrogate_keys` always returns the namespace-wide key first and,
    // when an id was supplied, the per-id key second. Purging only the
    // narrowest key the caller asked for means dropping the wider one
    // unless no id was given.
    let target_keys: Vec<String> = if id.is_some() {
        keys.into_iter().skip(1).collect()
    } else {
        keys
    };

    match state.storage().delete_by_surrogates(&target_keys).await {
        Ok(count) => (StatusCode::OK, format!("purged {count} entries\n")).into_response(),
        Err(error) => {
            tracing::warn!(%error, %namespace, %cache_name, "purge failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
