use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;

use crate::{
    app_state::AppState,
    cache::{key, storage::GetOutcome},
    types::{
        cache_entry::CacheEntry, request_context::RequestContext, request_parts::RequestParts,
        response::StoredResponse,
    },
};

use super::chain::{Middleware, MiddlewareResponse};

/// A single id's record queued for a post-response cache write
/// (`spec.md` §4.8 step 6).
#[derive(Debug, Clone)]
pub struct BulkWrite {
    pub primary_key: Vec<String>,
    pub surrogate_keys: Vec<String>,
    /// Already in on-disk form: either `null` or a one-element JSON array.
    pub body: Bytes,
}

/// What a single ordinal resolved to after the fan-out lookup and, if
/// needed, the consolidated miss fetch (`spec.md` §4.8 step 3).
enum Slot {
    /// Stored as the literal `null` — a deliberately cached negative.
    CachedNull,
    Value(serde_json::Value),
    Miss,
}

/// Fan-out cache-aside handling for bulk endpoints (C8, `spec.md` §4.8):
/// splits the id list out of the request URI, looks each one up in
/// storage concurrently, consolidates the misses into a single upstream
/// call, and reassembles one ordered JSON array for the client.
#[derive(Debug, Default)]
pub struct BulkEndpoint;

impl BulkEndpoint {
    fn applies(ctx: &RequestContext) -> Option<CacheEntry> {
        let decision = ctx.cacheability_info.as_ref()?;
        if !decision.is_cacheable || ctx.method != http::Method::GET {
            return None;
        }
        let cache_entry = decision.cache_entry.as_deref()?;
        cache_entry.bulk_support.then(|| cache_entry.clone())
    }

    /// Ids live in capture group 2 of the endpoint's pattern, distinct
    /// from the group-1 single-resource id used by [`key::extract_id`].
    fn ids(cache_entry: &CacheEntry, normalized_uri: &str) -> (Vec<String>, &'static str) {
        let Some(captures) = cache_entry.active_pattern().captures(normalized_uri) else {
            return (Vec::new(), ",");
        };
        let Some(group) = captures.get(2) else {
            return (Vec::new(), ",");
        };
        key::split_ids(group.as_str())
    }

    /// Splices `replacement` into the byte range captured by group 2,
    /// leaving everything else in the URI untouched (`spec.md` §4.8 step
    /// 2: "construct an individual URI from pattern by substituting
    /// `[i]` in the captured slot").
    fn substitute_ids(cache_entry: &CacheEntry, normalized_uri: &str, replacement: &str) -> Option<String> {
        let captures = cache_entry.active_pattern().captures(normalized_uri)?;
        let group = captures.get(2)?;
        let mut out = String::with_capacity(normalized_uri.len());
        out.push_str(&normalized_uri[..group.start()]);
        out.push_str(replacement);
        out.push_str(&normalized_uri[group.end()..]);
        Some(out)
    }

    fn id_identifier(cache_entry: &CacheEntry) -> &str {
        cache_entry.id_identifier.as_deref().unwrap_or("id")
    }
}

#[async_trait::async_trait]
impl Middleware for BulkEndpoint {
    fn name(&self) -> &'static str {
        "bulk-endpoint"
    }

    async fn on_request(
        &self,
        req: &RequestParts,
        ctx: &mut RequestContext,
        state: &AppState,
    ) -> Option<MiddlewareResponse> {
        let cache_entry = Self::applies(ctx)?;
        let (ids, separator) = Self::ids(&cache_entry, &ctx.normalized_uri);
        if ids.is_empty() {
            return None;
        }
        let cache_name = ctx
            .cacheability_info
            .as_ref()
            .and_then(|d| d.cache_name.clone())
            .unwrap_or_default();

        let per_id_keys: Vec<Vec<String>> = ids
            .iter()
            .map(|id| {
                let uri = Self::substitute_ids(&cache_entry, &ctx.normalized_uri, id)
                    .unwrap_or_else(|| ctx.normalized_uri.clone());
                key::primary_key(
                    &uri,
                    &ctx.method,
                    None,
                    &ctx.destination,
                    &cache_name,
                    &cache_entry,
                    ctx.service_config.as_deref().expect("cacheable implies service_config"),
                    &req.headers,
                )
            })
            .collect();

        let lookups = join_all(per_id_keys.iter().map(|key| state.storage().get(key))).await;

        let mut slots: Vec<Slot> = Vec::with_capacity(ids.len());
        let mut header_pool: Vec<(String, String)> = Vec::new();
        let mut read_failure = false;
        for outcome in lookups {
            match outcome {
                GetOutcome::Hit(response) => {
                    union_headers(&mut header_pool, &response.without_hop_by_hop());
                    match serde_json::from_slice::<serde_json::Value>(&response.body) {
                        Ok(serde_json::Value::Null) => slots.push(Slot::CachedNull),
                        Ok(serde_json::Value::Array(mut items)) if items.len() == 1 => {
                            slots.push(Slot::Value(items.remove(0)));
                        }
                        _ => slots.push(Slot::Miss),
                    }
                }
                GetOutcome::Miss => slots.push(Slot::Miss),
                GetOutcome::Error => {
                    read_failure = true;
                    slots.push(Slot::Miss);
                }
            }
        }

        let miss_ordinals: Vec<usize> =
            slots.iter().enumerate().filter(|(_, s)| matches!(s, Slot::Miss)).map(|(i, _)| i).collect();

        if miss_ordinals.is_empty() {
            ctx.cache_status = "hit".to_string();
            return Some(MiddlewareResponse::cached(assemble(&slots, &header_pool)));
        }
        ctx.cache_status = "miss".to_string();

        let miss_ids: Vec<&str> = miss_ordinals.iter().map(|&i| ids[i].as_str()).collect();
        let joined_misses = miss_ids.join(separator);
        let Some(sub_uri) = Self::substitute_ids(&cache_entry, &ctx.normalized_uri, &joined_misses) else {
            return Some(MiddlewareResponse::cached(assemble(&slots, &header_pool)));
        };

        let fetched = fetch_misses(req, ctx, state, &sub_uri).await;
        match fetched {
            FetchOutcome::NonJson(response, content_type) => {
                ctx.cache_status = format!("unable to process response; content-type is {content_type}");
                return Some(MiddlewareResponse::proxied(response));
            }
            FetchOutcome::NonOk(response) => {
                ctx.cache_status = format!("non-cacheable-response: status code is {}", response.status);
                return Some(MiddlewareResponse::proxied(response));
            }
            FetchOutcome::Ok(items) => {
                let id_field = Self::id_identifier(&cache_entry);
                for item in items {
                    let Some(id_value) = item.get(id_field) else { continue };
                    let id_str = url_escape(&value_as_id_string(id_value));
                    if let Some(pos) = miss_ordinals.iter().find(|&&i| ids[i] == id_str) {
                        slots[*pos] = Slot::Value(item);
                    }
                }
            }
        }

        // §4.8 step 6: "Skip if read_failure."
        if !read_failure {
            for &ordinal in &miss_ordinals {
                let write_null = !cache_entry.dont_cache_missing_ids;
                match &slots[ordinal] {
                    Slot::Value(value) => ctx.bulk_pending_writes.push(BulkWrite {
                        primary_key: per_id_keys[ordinal].clone(),
                        surrogate_keys: key::surrogate_keys(
                            &ctx.destination,
                            &cache_name,
                            Some(ids[ordinal].as_str()),
                        ),
                        body: Bytes::from(serde_json::Value::Array(vec![value.clone()]).to_string()),
                    }),
                    Slot::Miss if write_null => ctx.bulk_pending_writes.push(BulkWrite {
                        primary_key: per_id_keys[ordinal].clone(),
                        surrogate_keys: key::surrogate_keys(
                            &ctx.destination,
                            &cache_name,
                            Some(ids[ordinal].as_str()),
                        ),
                        body: Bytes::from_static(b"null"),
                    }),
                    Slot::Miss | Slot::CachedNull => {}
                }
            }
        }

        Some(MiddlewareResponse::cached(assemble(&slots, &header_pool)))
    }

    async fn after_response(
        &self,
        ctx: &RequestContext,
        _response: &MiddlewareResponse,
        state: &AppState,
    ) {
        let Some(cache_entry) = Self::applies(ctx) else {
            return;
        };
        let ttl = Duration::from_secs(cache_entry.ttl_seconds);
        for write in &ctx.bulk_pending_writes {
            let stored = StoredResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: write.body.clone(),
            };
            state
                .storage()
                .store(&write.primary_key, write.surrogate_keys.clone(), stored, ttl)
                .await;
        }
    }
}

enum FetchOutcome {
    Ok(Vec<serde_json::Value>),
    NonOk(StoredResponse),
    NonJson(StoredResponse, String),
}

async fn fetch_misses(req: &RequestParts, ctx: &RequestContext, state: &AppState, sub_uri: &str) -> FetchOutcome {
    let global = state.config().global().await;
    let smartstack = state.config().smartstack().await;
    let envoy = state.config().envoy().await;

    let resolved = match crate::upstream::resolve(&ctx.destination, sub_uri, &global, &smartstack, envoy.as_deref()) {
        Ok(resolved) => resolved,
        Err(error) => {
            return FetchOutcome::NonOk(StoredResponse {
                status: 502,
                headers: vec![("content-type".to_string(), "text/plain".to_string())],
                body: Bytes::from(format!("Error resolving {}: {error}", ctx.destination)),
            });
        }
    };

    let mut headers = crate::types::response::strip_hop_by_hop(&req.headers);
    if let Some(svc) = resolved.svc_header {
        if let Ok(value) = http::HeaderValue::from_str(&svc) {
            headers.insert(http::HeaderName::from_static("x-yelp-svc"), value);
        }
    }
    let timeout = Duration::from_millis(global.casper.http.timeout_ms);
    let response = state
        .upstream()
        .forward(ctx.method.clone(), &resolved.absolute_uri, headers, Bytes::new(), timeout)
        .await;

    if response.status != 200 {
        return FetchOutcome::NonOk(response);
    }

    let content_type = response.header("content-type").unwrap_or("").to_string();
    if !content_type.starts_with("application/json") {
        return FetchOutcome::NonJson(response, content_type);
    }

    match serde_json::from_slice::<serde_json::Value>(&response.body) {
        Ok(serde_json::Value::Array(items)) => FetchOutcome::Ok(items),
        _ => FetchOutcome::Ok(Vec::new()),
    }
}

fn url_escape(value: &str) -> String {
    // Ids are digit/comma-shaped in every configured pattern this crate
    // has seen; percent-encoding only ever touches the separator.
    value.replace(',', "%2C")
}

fn value_as_id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Adds each header from `incoming` to `pool` unless a header with the
/// same name (case-insensitive) is already present (`spec.md` §4.8 step
/// 3 "Union response headers from all hits into a header pool").
fn union_headers(pool: &mut Vec<(String, String)>, incoming: &[(String, String)]) {
    for (name, value) in incoming {
        if !pool.iter().any(|(existing, _)| existing.eq_ignore_ascii_case(name)) {
            pool.push((name.clone(), value.clone()));
        }
    }
}

/// Ordinal order, nils dropped (`spec.md` §4.8 step 5). Headers are the
/// pool collected from every hit slot during collation, with the
/// assembled body's own `content-type` always winning.
fn assemble(slots: &[Slot], header_pool: &[(String, String)]) -> StoredResponse {
    let array: Vec<serde_json::Value> = slots
        .iter()
        .filter_map(|slot| match slot {
            Slot::Value(v) => Some(v.clone()),
            Slot::CachedNull | Slot::Miss => None,
        })
        .collect();
    let body = serde_json::Value::Array(array).to_string();

    let mut headers: Vec<(String, String)> = header_pool
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
        .cloned()
        .collect();
    headers.push(("content-type".to_string(), "application/json".to_string()));

    StoredResponse { status: 200, headers, body: Bytes::from(body) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cache_entry::CacheEntryConfig;

    fn bulk_entry() -> CacheEntry {
        CacheEntryConfig {
            pattern: r"^/biz/bulk/(ignored)\?ids=([0-9%2C,]+)$".to_string(),
            bulk_support: true,
            id_identifier: Some("id".to_string()),
            ..CacheEntryConfig::default()
        }
        .compile("bulk".to_string())
        .unwrap()
    }

    #[test]
    fn ids_splits_captured_group_two_preferring_escaped_separator() {
        let entry = bulk_entry();
        let (ids, separator) = BulkEndpoint::ids(&entry, "/biz/bulk/ignored?ids=1%2C2%2C3");
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(separator, "%2C");
    }

    #[test]
    fn ids_empty_when_pattern_does_not_match() {
        let entry = bulk_entry();
        let (ids, _) = BulkEndpoint::ids(&entry, "/biz/other");
        assert!(ids.is_empty());
    }

    #[test]
    fn substitute_ids_splices_replacement_into_captured_range_only() {
        let entry = bulk_entry();
        let uri = BulkEndpoint::substitute_ids(&entry, "/biz/bulk/ignored?ids=1%2C2%2C3", "2").unwrap();
        assert_eq!(uri, "/biz/bulk/ignored?ids=2");
    }

    #[test]
    fn assemble_preserves_ordinal_order_and_drops_nulls_and_misses() {
        let slots = vec![
            Slot::Value(serde_json::json!({"id": 1})),
            Slot::CachedNull,
            Slot::Miss,
            Slot::Value(serde_json::json!({"id": 4})),
        ];
        let response = assemble(&slots, &[]);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, serde_json::json!([{"id": 1}, {"id": 4}]));
    }

    #[test]
    fn assemble_content_type_always_wins_over_pooled_value() {
        let header_pool = vec![("content-type".to_string(), "text/plain".to_string())];
        let response = assemble(&[], &header_pool);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("content-type")).count(), 1);
    }

    #[test]
    fn assemble_carries_forward_unioned_non_content_type_headers() {
        let header_pool = vec![("x-served-by".to_string(), "host-a".to_string())];
        let response = assemble(&[], &header_pool);
        assert_eq!(response.header("x-served-by"), Some("host-a"));
    }

    #[test]
    fn union_headers_first_seen_wins_case_insensitively() {
        let mut pool = vec![("X-Served-By".to_string(), "host-a".to_string())];
        union_headers(&mut pool, &[("x-served-by".to_string(), "host-b".to_string())]);
        assert_eq!(pool, vec![("X-Served-By".to_string(), "host-a".to_string())]);
    }

    #[test]
    fn union_headers_adds_new_names_from_later_hits() {
        let mut pool = vec![("x-served-by".to_string(), "host-a".to_string())];
        union_headers(&mut pool, &[("x-region".to_string(), "sf".to_string())]);
        assert_eq!(
            pool,
            vec![("x-served-by".to_string(), "host-a".to_string()), ("x-region".to_string(), "sf".to_string())]
        );
    }
}
