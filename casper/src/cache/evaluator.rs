use std::sync::Arc;

use http::{HeaderMap, Method};

use crate::config::{destination::ServiceConfigSnapshot, global::GlobalConfig};
use crate::types::cache_decision::CacheDecision;

const NO_CACHE_HEADERS_TRUTHY: &[(&str, &[&str])] = &[
    ("x-strongly-consistent-read", &["1", "true"]),
    ("x-force-master-read", &["1", "true"]),
    ("cache-control", &["no-cache"]),
    ("pragma", &["no-cache", "spectre-no-cache"]),
];

/// Produces a [`CacheDecision`] for one request (`spec.md` §4.3, C3).
/// The first entry in `service_config.cached_endpoints` whose method and
/// pattern match wins — config-load order is the search order
/// (invariant I1).
#[must_use]
pub fn evaluate(
    method: &Method,
    normalized_uri: &str,
    headers: &HeaderMap,
    destination: &str,
    service_config: Option<&ServiceConfigSnapshot>,
    global_config: &GlobalConfig,
    body: &[u8],
) -> CacheDecision {
    if global_config.casper.disable_caching {
        return CacheDecision::not_cacheable("caching disabled via configs");
    }

    let Some(service_config) = service_config else {
        return CacheDecision::not_cacheable(format!("non-configured-namespace ({destination})"));
    };

    for cache_entry in &service_config.cached_endpoints {
        if !cache_entry.request_method.matches(method) {
            continue;
        }
        if !cache_entry.active_pattern().is_match(normalized_uri) {
            continue;
        }

        if has_no_cache_header(headers) {
            return CacheDecision::refresh("no-cache-header", cache_entry.cache_name.clone(), Arc::clone(cache_entry));
        }

        if *method == Method::POST {
            if !content_type_is_json(headers) {
                return CacheDecision::not_cacheable("non-cacheable-content-type");
            }
            if cache_entry.bulk_support {
                return CacheDecision::not_cacheable("no-bulk-support-for-post");
            }
            let extracts_fields =
                cache_entry.enable_id_extraction || cache_entry.vary_body_field_list.is_some();
            if extracts_fields && body.is_empty() {
                return CacheDecision::not_cacheable("non-cacheable-missing-body");
            }
        }

        return CacheDecision::cacheable(cache_entry.cache_name.clone(), Arc::clone(cache_entry));
    }

    CacheDecision::not_cacheable(format!("non-cacheable-uri ({destination})"))
}

fn has_no_cache_header(headers: &HeaderMap) -> bool {
    NO_CACHE_HEADERS_TRUTHY
        .iter()
        .any(|(name, truthy)| header_value_matches(headers, name, truthy))
}

/// Header names are matched case-insensitively with `-`/`_` treated as
/// equivalent (`SPEC_FULL.md` §4.3.a), since `x_force_master_read` and
/// `X-Force-Master-Read` name the same signal to callers.
fn header_value_matches(headers: &HeaderMap, name: &str, truthy: &[&str]) -> bool {
    headers
        .iter()
        .find(|(header_name, _)| header_name.as_str().replace('_', "-").eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.to_str().ok())
        .map(|v| truthy.contains(&v.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn content_type_is_json(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cache_entry::CacheEntryConfig;

    fn snapshot(entries: Vec<(&str, CacheEntryConfig)>) -> ServiceConfigSnapshot {
        let cached_endpoints = entries
            .into_iter()
            .map(|(name, cfg)| Arc::new(cfg.compile(name.to_string()).unwrap()))
            .collect();
        ServiceConfigSnapshot {
            destination: "biz.main".to_string(),
            cached_endpoints,
            uncacheable_headers: Vec::new(),
            vary_headers: Vec::new(),
        }
    }

    #[test]
    fn disabled_caching_short_circuits() {
        let mut global = GlobalConfig::default();
        global.casper.disable_caching = true;
        let decision = evaluate(
            &Method::GET,
            "/biz/yelp-sf",
            &HeaderMap::new(),
            "biz.main",
            None,
            &global,
            b"",
        );
        assert!(!decision.is_cacheable);
        assert_eq!(decision.reason.as_deref(), Some("caching disabled via configs"));
    }

    #[test]
    fn missing_namespace_is_not_cacheable() {
        let decision = evaluate(
            &Method::GET,
            "/biz/yelp-sf",
            &HeaderMap::new(),
            "biz.main",
            None,
            &GlobalConfig::default(),
            b"",
        );
        assert!(!decision.is_cacheable);
        assert_eq!(
            decision.reason.as_deref(),
            Some("non-configured-namespace (biz.main)")
        );
    }

    #[test]
    fn matching_pattern_is_cacheable() {
        let cfg = CacheEntryConfig {
            pattern: "^/biz/.*$".to_string(),
            ..CacheEntryConfig::default()
        };
        let snapshot = snapshot(vec![("biz", cfg)]);
        let decision = evaluate(
            &Method::GET,
            "/biz/yelp-sf",
            &HeaderMap::new(),
            "biz.main",
            Some(&snapshot),
            &GlobalConfig::default(),
            b"",
        );
        assert!(decision.is_cacheable);
        assert_eq!(decision.cache_name.as_deref(), Some("biz"));
    }

    #[test]
    fn no_cache_header_forces_refresh() {
        let cfg = CacheEntryConfig {
            pattern: "^/biz/.*$".to_string(),
            ..CacheEntryConfig::default()
        };
        let snapshot = snapshot(vec![("biz", cfg)]);
        let mut headers = HeaderMap::new();
        headers.insert("pragma", "spectre-no-cache".parse().unwrap());
        let decision = evaluate(
            &Method::GET,
            "/biz/yelp-sf",
            &headers,
            "biz.main",
            Some(&snapshot),
            &GlobalConfig::default(),
            b"",
        );
        assert!(!decision.is_cacheable);
        assert!(decision.refresh_cache);
        assert_eq!(decision.reason.as_deref(), Some("no-cache-header"));
    }

    #[test]
    fn no_cache_header_matches_underscore_form() {
        let cfg = CacheEntryConfig {
            pattern: "^/biz/.*$".to_string(),
            ..CacheEntryConfig::default()
        };
        let snapshot = snapshot(vec![("biz", cfg)]);
        let mut headers = HeaderMap::new();
        headers.insert("x_force_master_read", "true".parse().unwrap());
        let decision = evaluate(
            &Method::GET,
            "/biz/yelp-sf",
            &headers,
            "biz.main",
            Some(&snapshot),
            &GlobalConfig::default(),
            b"",
        );
        assert!(decision.refresh_cache);
        assert_eq!(decision.reason.as_deref(), Some("no-cache-header"));
    }

    #[test]
    fn first_matching_entry_wins_in_declared_order() {
        let narrow = CacheEntryConfig {
            pattern: "^/biz/yelp-sf$".to_string(),
            ..CacheEntryConfig::default()
        };
        let wide = CacheEntryConfig {
            pattern: "^/biz/.*$".to_string(),
            ..CacheEntryConfig::default()
        };
        let snapshot = snapshot(vec![("narrow", narrow), ("wide", wide)]);
        let decision = evaluate(
            &Method::GET,
            "/biz/yelp-sf",
            &HeaderMap::new(),
            "biz.main",
            Some(&snapshot),
            &GlobalConfig::default(),
            b"",
        );
        assert_eq!(decision.cache_name.as_deref(), Some("narrow"));
    }

    #[test]
    fn post_with_missing_body_and_vary_fields_is_non_cacheable() {
        let cfg = CacheEntryConfig {
            pattern: "^/biz/.*$".to_string(),
            request_method: crate::types::cache_entry::RequestMethod::Post,
            vary_body_field_list: Some(vec!["region".to_string()]),
            ..CacheEntryConfig::default()
        };
        let snapshot = snapshot(vec![("biz", cfg)]);
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
        let decision = evaluate(
            &Method::POST,
            "/biz/yelp-sf",
            &headers,
            "biz.main",
            Some(&snapshot),
            &GlobalConfig::default(),
            b"",
        );
        assert!(!decision.is_cacheable);
        assert_eq!(decision.reason.as_deref(), Some("non-cacheable-missing-body"));
    }
}
