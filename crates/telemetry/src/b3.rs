//! Minimal B3 (Zipkin) single/multi-header trace propagation.
//!
//! No propagator crate in the reference corpus speaks B3 (the
//! `opentelemetry` ecosystem's zipkin support lives in a separate crate
//! not pulled in here), so extraction/injection is hand-rolled against
//! the headers named in the B3 spec. This backs `X-Zipkin-Id` on
//! proxied responses and the syslog trace line in
//! [`crate::syslog_trace`].

use http::{HeaderMap, HeaderValue};

pub const TRACE_ID: &str = "x-b3-traceid";
pub const SPAN_ID: &str = "x-b3-spanid";
pub const PARENT_SPAN_ID: &str = "x-b3-parentspanid";
pub const SAMPLED: &str = "x-b3-sampled";
pub const FLAGS: &str = "x-b3-flags";

/// A single request's B3 propagation fields, as extracted on entry and
/// (possibly regenerated) rewritten on egress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct B3Context {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub sampled: Option<bool>,
    pub flags: Option<String>,
}

impl B3Context {
    /// Extracts a B3 context from request headers, if any `X-B3-*`
    /// headers are present. Returns `None` when there's no trace id to
    /// propagate -- callers that want one unconditionally should
    /// generate a fresh one instead.
    #[must_use]
    pub fn extract(headers: &HeaderMap) -> Option<Self> {
        let trace_id = header_str(headers, TRACE_ID)?.to_string();
        let span_id = header_str(headers, SPAN_ID)
            .map(str::to_string)
            .unwrap_or_else(new_id);
        let parent_span_id =
            header_str(headers, PARENT_SPAN_ID).map(str::to_string);
        let sampled = header_str(headers, SAMPLED).map(|v| v == "1");
        let flags = header_str(headers, FLAGS).map(str::to_string);
        Some(Self {
            trace_id,
            span_id,
            parent_span_id,
            sampled,
            flags,
        })
    }

    /// Generates a fresh root trace context (no parent).
    #[must_use]
    pub fn generate() -> Self {
        Self {
            trace_id: new_id(),
            span_id: new_id(),
            parent_span_id: None,
            sampled: Some(true),
            flags: None,
        }
    }

    /// Derives a child span from `self`, sharing the trace id.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_id(),
            parent_span_id: Some(self.span_id.clone()),
            sampled: self.sampled,
            flags: self.flags.clone(),
        }
    }

    /// Writes the `X-B3-*` headers for propagation to an upstream, or
    /// for echoing back on a response.
    pub fn inject(&self, headers: &mut HeaderMap) {
        insert(headers, TRACE_ID, &self.trace_id);
        insert(headers, SPAN_ID, &self.span_id);
        if let Some(parent) = &self.parent_span_id {
            insert(headers, PARENT_SPAN_ID, parent);
        }
        if let Some(sampled) = self.sampled {
            insert(headers, SAMPLED, if sampled { "1" } else { "0" });
        }
        if let Some(flags) = &self.flags {
            insert(headers, FLAGS, flags);
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// 64-bit hex identifier, good enough for both trace and span ids here;
/// real B3 trace ids may be 128-bit but 64-bit is a conformant subset.
fn new_id() -> String {
    format!("{:016x}", uuid::Uuid::new_v4().as_u128() as u64)
}
