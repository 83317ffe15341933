use http::{HeaderMap, Method};
use regex::Regex;

use crate::config::destination::ServiceConfigSnapshot;
use crate::types::cache_entry::CacheEntry;

/// Computes the primary key for a cacheable request (`spec.md` §4.4, C4).
/// Deterministic for the same (method, normalized URI, vary headers,
/// relevant body fields, destination, cache name) — invariant I2.
#[must_use]
pub fn primary_key(
    normalized_uri: &str,
    method: &Method,
    normalized_body: Option<&serde_json::Value>,
    destination: &str,
    cache_name: &str,
    cache_entry: &CacheEntry,
    service_config: &ServiceConfigSnapshot,
    headers: &HeaderMap,
) -> Vec<String> {
    let mut key = vec![normalized_uri.to_string()];

    if *method == Method::POST {
        if let Some(serde_json::Value::Object(fields)) = normalized_body {
            let mut names: Vec<&String> = fields.keys().collect();
            names.sort();
            for name in names {
                key.push(name.clone());
                key.push(value_to_key_string(&fields[name]));
            }
        }
    }

    key.push(destination.to_string());
    key.push(cache_name.to_string());

    let vary_names: &[String] = cache_entry
        .vary_headers
        .as_deref()
        .unwrap_or(&service_config.vary_headers);
    for name in vary_names {
        let value = headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        key.push(value.to_string());
    }

    key
}

fn value_to_key_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Surrogate keys for a stored record (`spec.md` §4.4). Always includes
/// the namespace-wide key; includes the per-id key too when an id was
/// extracted from the URI.
#[must_use]
pub fn surrogate_keys(destination: &str, cache_name: &str, extracted_id: Option<&str>) -> Vec<String> {
    let mut keys = vec![format!("{destination}|{cache_name}")];
    if let Some(id) = extracted_id {
        keys.push(format!("{destination}|{cache_name}|{id}"));
    }
    keys
}

/// Extracts the first capture group of `pattern` against `normalized_uri`
/// and returns its leading element after splitting on `%2C` or `,`
/// (`spec.md` §4.4 "GET & enable_id_extraction").
#[must_use]
pub fn extract_id(pattern: &Regex, normalized_uri: &str) -> Option<String> {
    let captures = pattern.captures(normalized_uri)?;
    let group = captures.get(1)?.as_str();
    let (ids, _separator) = split_ids(group);
    ids.into_iter().next()
}

/// Splits a delimited id-list substring on whichever of `%2C`/`,` actually
/// produces more than one piece, preferring `%2C` on a tie (`spec.md`
/// §4.8 step 1). Returns the pieces and the separator used, so callers
/// that rebuild a miss-id list can rejoin with the same separator.
#[must_use]
pub fn split_ids(s: &str) -> (Vec<String>, &'static str) {
    let by_escaped: Vec<&str> = s.split("%2C").collect();
    if by_escaped.len() > 1 {
        return (by_escaped.into_iter().map(str::to_string).collect(), "%2C");
    }
    let by_comma: Vec<&str> = s.split(',').collect();
    if by_comma.len() > 1 {
        return (by_comma.into_iter().map(str::to_string).collect(), ",");
    }
    (vec![s.to_string()], ",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cache_entry::CacheEntryConfig;

    fn snapshot() -> ServiceConfigSnapshot {
        ServiceConfigSnapshot {
            destination: "biz.main".to_string(),
            cached_endpoints: Vec::new(),
            uncacheable_headers: Vec::new(),
            vary_headers: Vec::new(),
        }
    }

    #[test]
    fn primary_key_includes_uri_destination_and_cache_name() {
        let cfg = CacheEntryConfig {
            pattern: "^/biz/.*$".to_string(),
            ..CacheEntryConfig::default()
        };
        let entry = cfg.compile("biz".to_string()).unwrap();
        let key = primary_key(
            "/biz/yelp-sf",
            &Method::GET,
            None,
            "biz.main",
            "biz",
            &entry,
            &snapshot(),
            &HeaderMap::new(),
        );
        assert_eq!(key, vec!["/biz/yelp-sf", "biz.main", "biz"]);
    }

    #[test]
    fn primary_key_for_post_is_sorted_by_field_name() {
        let cfg = CacheEntryConfig {
            pattern: "^/biz/.*$".to_string(),
            request_method: crate::types::cache_entry::RequestMethod::Post,
            ..CacheEntryConfig::default()
        };
        let entry = cfg.compile("biz".to_string()).unwrap();
        let body = serde_json::json!({"region": "sf", "id": 1});
        let key = primary_key(
            "/biz/search",
            &Method::POST,
            Some(&body),
            "biz.main",
            "biz",
            &entry,
            &snapshot(),
            &HeaderMap::new(),
        );
        assert_eq!(
            key,
            vec!["/biz/search", "id", "1", "region", "sf", "biz.main", "biz"]
        );
    }

    #[test]
    fn surrogate_keys_include_id_when_extracted() {
        let keys = surrogate_keys("biz.main", "biz", Some("7"));
        assert_eq!(keys, vec!["biz.main|biz", "biz.main|biz|7"]);
    }

    #[test]
    fn surrogate_keys_without_id() {
        let keys = surrogate_keys("biz.main", "biz", None);
        assert_eq!(keys, vec!["biz.main|biz"]);
    }

    #[test]
    fn split_ids_prefers_escaped_separator() {
        let (ids, sep) = split_ids("1%2C2%2C3");
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(sep, "%2C");
    }

    #[test]
    fn split_ids_falls_back_to_comma() {
        let (ids, sep) = split_ids("1,2,3");
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(sep, ",");
    }

    #[test]
    fn split_ids_single_id_has_no_real_separator() {
        let (ids, _) = split_ids("7");
        assert_eq!(ids, vec!["7"]);
    }

    #[test]
    fn extract_id_takes_first_of_capture_group() {
        let pattern = Regex::new(r"^/users\?ids=((?:\d|%2C)+)&v=1$").unwrap();
        let id = extract_id(&pattern, "/users?ids=1%2C2%2C3&v=1").unwrap();
        assert_eq!(id, "1");
    }
}
