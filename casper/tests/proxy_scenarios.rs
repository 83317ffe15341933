//! End-to-end scenarios driven straight through `casper::pipeline::handle`
//! and `casper::internal::route`, mirroring the worked examples in
//! `spec.md` §8.

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::extract::{ConnectInfo, State};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Uri};
use http_body_util::BodyExt;

use casper::{
    app_state::{AppState, InnerAppState},
    cache::storage::{GetOutcome, Storage},
    config::registry::{ConfigRegistry, RegistryPaths},
    internal,
    middleware::{
        chain::{Forwarder, MiddlewareResponse},
        BulkEndpoint, CacheabilityMiddleware, Chain, FilterRegistry, SingleEndpoint,
    },
    observability::Observability,
    pipeline,
    types::{request_context::RequestContext, request_parts::RequestParts, response::StoredResponse},
};
use telemetry::metrics_relay::NullMetricsSink;

/// A [`Forwarder`] that counts invocations and always returns the same
/// canned response, standing in for the real upstream client.
#[derive(Debug)]
struct StubForwarder {
    calls: AtomicUsize,
    response: StoredResponse,
}

impl StubForwarder {
    fn new(response: StoredResponse) -> Self {
        Self { calls: AtomicUsize::new(0), response }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forwarder for StubForwarder {
    async fn forward(
        &self,
        _req: &RequestParts,
        _ctx: &mut RequestContext,
        _state: &AppState,
    ) -> MiddlewareResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MiddlewareResponse::proxied(self.response.clone())
    }
}

fn json_response(status: u16, body: &'static [u8]) -> StoredResponse {
    StoredResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Bytes::from_static(body),
    }
}

struct Harness {
    dir: PathBuf,
    state: AppState,
    forwarder: Arc<StubForwarder>,
}

impl Harness {
    /// `destinations` is `(destination, yaml body)`; each is written to
    /// `<tmp>/<destination>.yaml` before the registry is constructed.
    async fn build(destinations: &[(&str, &str)], canned_upstream: StoredResponse) -> Self {
        let dir = std::env::temp_dir().join(format!("casper-scenario-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        for (destination, yaml) in destinations {
            tokio::fs::write(dir.join(format!("{destination}.yaml")), yaml).await.unwrap();
        }

        let paths = RegistryPaths {
            srv_configs_path: dir.clone(),
            services_yaml_path: dir.join("services.yaml"),
            envoy_configs_path: dir.clone(),
        };
        let registry = Arc::new(ConfigRegistry::load(paths).await.unwrap());

        let forwarder = Arc::new(StubForwarder::new(canned_upstream));
        let chain = Chain::new(vec![
            Arc::new(CacheabilityMiddleware),
            Arc::new(SingleEndpoint),
            Arc::new(BulkEndpoint),
        ]);

        let state = AppState::new(InnerAppState {
            config: registry,
            storage: Storage::in_process(),
            upstream: casper::upstream::UpstreamClient::new(),
            observability: Observability::new(Arc::new(NullMetricsSink), None),
            filters: FilterRegistry::default(),
            worker_id: "test-worker".to_string(),
            chain,
            forwarder: forwarder.clone() as Arc<dyn Forwarder>,
            task_tracker: tokio_util::task::TaskTracker::new(),
        });

        Self { dir, state, forwarder }
    }

    async fn request(&self, method: Method, uri: &str, headers: Vec<(&str, &str)>) -> (http::StatusCode, HeaderMap, Bytes) {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(
                http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        let response = pipeline::handle(
            State(self.state.clone()),
            ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))),
            method,
            uri.parse::<Uri>().unwrap(),
            header_map,
            Bytes::new(),
        )
        .await;
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, parts.headers, bytes)
    }

    async fn cleanup(self) {
        tokio::fs::remove_dir_all(&self.dir).await.ok();
    }
}

const PROXY_HEADERS: [(&str, &str); 2] =
    [("x-smartstack-source", "clients.test"), ("x-smartstack-destination", "biz.main")];

fn with_proxy_headers(mut extra: Vec<(&'static str, &'static str)>) -> Vec<(&'static str, &'static str)> {
    let mut headers = PROXY_HEADERS.to_vec();
    headers.append(&mut extra);
    headers
}

const BIZ_CONFIG: &str = "cached_endpoints:\n  biz:\n    pattern: \"^/biz/.*$\"\n    ttl: 60\n";

#[tokio::test]
async fn s1_simple_hit_serves_from_storage_without_calling_upstream() {
    let harness = Harness::build(&[("biz.main", BIZ_CONFIG)], json_response(200, b"{\"unused\":true}")).await;

    harness
        .state
        .storage()
        .store(
            &["/biz/yelp-sf".to_string(), "biz.main".to_string(), "biz".to_string()],
            vec!["biz.main|biz".to_string()],
            json_response(200, b"{\"name\":\"yelp\"}"),
            Duration::from_secs(60),
        )
        .await;

    let (status, headers, body) =
        harness.request(Method::GET, "/biz/yelp-sf", with_proxy_headers(vec![])).await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body.as_ref(), b"{\"name\":\"yelp\"}");
    assert_eq!(headers.get("spectre-cache-status").unwrap(), "hit");
    assert_eq!(harness.forwarder.call_count(), 0);

    harness.cleanup().await;
}

#[tokio::test]
async fn s2_miss_then_hit_calls_upstream_exactly_once() {
    let harness = Harness::build(&[("biz.main", BIZ_CONFIG)], json_response(200, b"{\"ok\":1}")).await;

    let (status, headers, body) = harness
        .request(Method::GET, "/biz/yelp-sf", with_proxy_headers(vec![("x-casper-sync", "1")]))
        .await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body.as_ref(), b"{\"ok\":1}");
    assert_eq!(headers.get("spectre-cache-status").unwrap(), "miss");
    assert_eq!(harness.forwarder.call_count(), 1);

    let (status, headers, body) = harness
        .request(Method::GET, "/biz/yelp-sf", with_proxy_headers(vec![]))
        .await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body.as_ref(), b"{\"ok\":1}");
    assert_eq!(headers.get("spectre-cache-status").unwrap(), "hit");
    assert_eq!(harness.forwarder.call_count(), 1, "upstream must not be called again on a hit");

    harness.cleanup().await;
}

/// Query-parameter order must not affect the cache key (`spec.md` §4.2):
/// two requests differing only in param order collapse onto the same
/// storage record, so only the first calls upstream.
#[tokio::test]
async fn s3_query_normalization_produces_stable_cache_key() {
    let harness = Harness::build(&[("biz.main", BIZ_CONFIG)], json_response(200, b"{\"ok\":1}")).await;

    let (status, _headers, body) = harness
        .request(
            Method::GET,
            "/biz/yelp-sf?region=sf&sort=rating",
            with_proxy_headers(vec![("x-casper-sync", "1")]),
        )
        .await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body.as_ref(), b"{\"ok\":1}");
    assert_eq!(harness.forwarder.call_count(), 1);

    let (status, headers, body) = harness
        .request(Method::GET, "/biz/yelp-sf?sort=rating&region=sf", with_proxy_headers(vec![]))
        .await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body.as_ref(), b"{\"ok\":1}");
    assert_eq!(headers.get("spectre-cache-status").unwrap(), "hit");
    assert_eq!(
        harness.forwarder.call_count(),
        1,
        "reordered query params must hit the same cache key, not call upstream again"
    );

    harness.cleanup().await;
}

const BULK_CONFIG: &str = r#"cached_endpoints:
  bulk:
    pattern: "^/biz/bulk/(ignored)\\?ids=([0-9%2C,]+)$"
    ttl: 60
    bulk_support: true
    id_identifier: "id"
"#;

#[tokio::test]
async fn s4_bulk_fanout_all_hits_never_calls_upstream() {
    let harness = Harness::build(&[("biz.main", BULK_CONFIG)], json_response(200, b"[]")).await;

    for (id, name) in [("1", "a"), ("2", "b"), ("3", "c")] {
        harness
            .state
            .storage()
            .store(
                &[format!("/biz/bulk/ignored?ids={id}"), "biz.main".to_string(), "bulk".to_string()],
                vec!["biz.main|bulk".to_string(), format!("biz.main|bulk|{id}")],
                StoredResponse {
                    status: 200,
                    headers: vec![("content-type".to_string(), "application/json".to_string())],
                    body: Bytes::from(format!("[{{\"id\":{id},\"name\":\"{name}\"}}]")),
                },
                Duration::from_secs(60),
            )
            .await;
    }

    let (status, headers, body) = harness
        .request(Method::GET, "/biz/bulk/ignored?ids=1%2C2%2C3", with_proxy_headers(vec![]))
        .await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(headers.get("spectre-cache-status").unwrap(), "hit");
    assert_eq!(harness.forwarder.call_count(), 0, "all ids hit, upstream must never be contacted");

    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}, {"id": 3, "name": "c"}])
    );

    harness.cleanup().await;
}

#[tokio::test]
async fn s5_purge_by_surrogate_evicts_only_the_targeted_id() {
    let harness = Harness::build(
        &[("destA", "cached_endpoints:\n  cacheA:\n    pattern: \"^/destA/.*$\"\n    ttl: 60\n")],
        json_response(200, b"{}"),
    )
    .await;

    harness
        .state
        .storage()
        .store(
            &["destA".to_string(), "cacheA".to_string(), "7".to_string()],
            vec!["destA|cacheA".to_string(), "destA|cacheA|7".to_string()],
            json_response(200, b"{\"id\":7}"),
            Duration::from_secs(60),
        )
        .await;
    harness
        .state
        .storage()
        .store(
            &["destA".to_string(), "cacheA".to_string(), "8".to_string()],
            vec!["destA|cacheA".to_string(), "destA|cacheA|8".to_string()],
            json_response(200, b"{\"id\":8}"),
            Duration::from_secs(60),
        )
        .await;

    let response = internal::route(
        &harness.state,
        &Method::DELETE,
        "/purge",
        Some("namespace=destA&cache_name=cacheA&id=7"),
        &HeaderMap::new(),
    )
    .await;
    assert_eq!(response.status(), http::StatusCode::OK);

    let id7 = harness
        .state
        .storage()
        .get(&["destA".to_string(), "cacheA".to_string(), "7".to_string()])
        .await;
    assert!(matches!(id7, GetOutcome::Miss), "id 7 should have been purged");

    let id8 = harness
        .state
        .storage()
        .get(&["destA".to_string(), "cacheA".to_string(), "8".to_string()])
        .await;
    assert!(matches!(id8, GetOutcome::Hit(_)), "id 8 must survive a purge scoped to id 7");

    harness.cleanup().await;
}

#[tokio::test]
async fn s6_no_cache_header_forces_refresh_and_overwrites_storage() {
    let harness = Harness::build(&[("biz.main", BIZ_CONFIG)], json_response(200, b"{\"v\":2}")).await;

    let (status, headers, body) = harness
        .request(
            Method::GET,
            "/biz/yelp-sf",
            with_proxy_headers(vec![("pragma", "spectre-no-cache"), ("x-casper-sync", "1")]),
        )
        .await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body.as_ref(), b"{\"v\":2}");
    assert_eq!(headers.get("spectre-cache-status").unwrap(), "no-cache-header");
    assert_eq!(harness.forwarder.call_count(), 1);

    let stored = harness
        .state
        .storage()
        .get(&["/biz/yelp-sf".to_string(), "biz.main".to_string(), "biz".to_string()])
        .await;
    match stored {
        GetOutcome::Hit(response) => assert_eq!(response.body.as_ref(), b"{\"v\":2}"),
        other => panic!("expected the refreshed response to be stored, got {other:?}"),
    }

    harness.cleanup().await;
}

#[tokio::test]
async fn purge_with_unknown_cache_name_is_rejected() {
    let harness = Harness::build(
        &[("destA", "cached_endpoints:\n  cacheA:\n    pattern: \"^/destA/.*$\"\n    ttl: 60\n")],
        json_response(200, b"{}"),
    )
    .await;

    let response = internal::route(
        &harness.state,
        &Method::DELETE,
        "/purge",
        Some("namespace=destA&cache_name=typo99"),
        &HeaderMap::new(),
    )
    .await;
    assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);

    harness.cleanup().await;
}

/// Malformed `X-Smartstack-*` headers (repeated values) are rejected
/// before the chain ever runs (`spec.md` §4.12).
#[tokio::test]
async fn repeated_smartstack_source_header_is_rejected() {
    let harness = Harness::build(&[("biz.main", BIZ_CONFIG)], json_response(200, b"{}")).await;

    let mut header_map = HeaderMap::new();
    header_map.append("x-smartstack-source", HeaderValue::from_static("a"));
    header_map.append("x-smartstack-source", HeaderValue::from_static("c"));
    header_map.insert("x-smartstack-destination", HeaderValue::from_static("biz.main"));

    let response = pipeline::handle(
        State(harness.state.clone()),
        ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))),
        Method::GET,
        "/biz/yelp-sf".parse().unwrap(),
        header_map,
        Bytes::new(),
    )
    .await;
    assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    assert_eq!(harness.forwarder.call_count(), 0);

    harness.cleanup().await;
}
