use std::{net::IpAddr, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use telemetry::b3::B3Context;

use crate::config::destination::ServiceConfigSnapshot;

use super::cache_decision::CacheDecision;

/// Per-request mutable state, owned by the pipeline driver (C12) and
/// borrowed by middlewares (C9). Mirrors `spec.md` §3 "Request context".
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: http::Method,
    pub uri: http::Uri,
    pub normalized_uri: String,
    pub normalized_body: Option<serde_json::Value>,
    pub remote_addr: Option<IpAddr>,
    pub destination: String,
    pub source: String,

    /// Immutable snapshot of the active destination config, valid for
    /// the lifetime of this request (`spec.md` I7).
    pub service_config: Option<Arc<ServiceConfigSnapshot>>,

    pub cacheability_info: Option<CacheDecision>,

    /// Present iff cacheable or force-refresh (`spec.md` §3).
    pub primary_key: Option<Vec<String>>,
    pub surrogate_keys: Vec<String>,
    pub extracted_id: Option<String>,

    /// Transcribed into `Spectre-Cache-Status` on the outgoing response.
    pub cache_status: String,

    /// Per-id records a bulk fetch resolved against upstream, queued by
    /// [`crate::middleware::bulk::BulkEndpoint::on_request`] and written
    /// to storage from `after_response` once the client has the
    /// response (`spec.md` §4.8, invariant I4).
    pub bulk_pending_writes: Vec<crate::middleware::bulk::BulkWrite>,

    pub trace: Option<B3Context>,

    pub start_time: DateTime<Utc>,
    pub start_instant: Instant,
    pub end_time: Option<DateTime<Utc>>,
    pub response_status: Option<u16>,
}

impl RequestContext {
    #[must_use]
    pub fn new(
        method: http::Method,
        uri: http::Uri,
        remote_addr: Option<IpAddr>,
        destination: String,
        source: String,
    ) -> Self {
        Self {
            method,
            uri,
            normalized_uri: String::new(),
            normalized_body: None,
            remote_addr,
            destination,
            source,
            service_config: None,
            cacheability_info: None,
            primary_key: None,
            surrogate_keys: Vec::new(),
            extracted_id: None,
            cache_status: String::new(),
            bulk_pending_writes: Vec::new(),
            trace: None,
            start_time: Utc::now(),
            start_instant: Instant::now(),
            end_time: None,
            response_status: None,
        }
    }

    pub fn finish(&mut self, status: http::StatusCode) {
        self.end_time = Some(Utc::now());
        self.response_status = Some(status.as_u16());
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_instant.elapsed()
    }
}
