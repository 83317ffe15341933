use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Hop-by-hop headers that are never forwarded or cached, per `spec.md`
/// §3 "Stored record".
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// A cacheable HTTP response record: what the storage abstraction
/// persists and what the upstream client returns. Headers are a
/// case-insensitive map that preserves the case of first occurrence,
/// realized here as an ordered `Vec` of pairs searched case-insensitively
/// (`spec.md` §3 "Response").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StoredResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers minus the fixed hop-by-hop set (`spec.md` §4.6
    /// `uncacheable_headers`).
    #[must_use]
    pub fn without_hop_by_hop(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter(|(k, _)| !is_hop_by_hop(k))
            .cloned()
            .collect()
    }

    /// Headers minus hop-by-hop and minus destination-configured
    /// uncacheable headers (`spec.md` §4.6 `cacheable_headers`).
    #[must_use]
    pub fn without_uncacheable(&self, destination_uncacheable: &[String]) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter(|(k, _)| {
                !is_hop_by_hop(k)
                    && !destination_uncacheable
                        .iter()
                        .any(|h| h.eq_ignore_ascii_case(k))
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn header_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect()
    }
}

#[must_use]
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Strips hop-by-hop headers from an outbound `http::HeaderMap`
/// (`spec.md` §6 "Hop-by-hop headers are stripped in both directions").
/// Companion to [`StoredResponse::without_hop_by_hop`] for the request
/// side, where headers live in `http::HeaderMap` rather than the
/// `Vec<(String, String)>` storage records use.
#[must_use]
pub fn strip_hop_by_hop(headers: &http::HeaderMap) -> http::HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
