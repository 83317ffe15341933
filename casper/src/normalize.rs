use std::collections::BTreeSet;

use crate::types::cache_entry::CacheEntry;

/// Canonicalizes query-parameter order so equivalent requests collapse to
/// the same cache key (`spec.md` §4.2, invariant P3). The path component is
/// left untouched.
#[must_use]
pub fn normalize_uri(uri: &str) -> String {
    let Some((path, query)) = uri.split_once('?') else {
        return uri.to_string();
    };
    if query.is_empty() {
        return path.to_string();
    }
    let mut params: Vec<&str> = query.split('&').collect();
    params.sort_unstable();
    format!("{path}?{}", params.join("&"))
}

/// Projects `{post_body_id} ∪ vary_body_field_list` out of a POST body into
/// a canonical, key-sorted JSON object (`spec.md` §4.2, invariant P4).
/// Missing fields are included as `null`. Returns `None` for an empty body.
#[must_use]
pub fn normalize_body(body: &[u8], cache_entry: &CacheEntry) -> Option<serde_json::Value> {
    if body.is_empty() {
        return None;
    }
    let parsed: serde_json::Value = serde_json::from_slice(body).ok()?;

    let mut fields = BTreeSet::new();
    if let Some(id) = &cache_entry.post_body_id {
        fields.insert(id.clone());
    }
    if let Some(vary) = &cache_entry.vary_body_field_list {
        fields.extend(vary.iter().cloned());
    }
    if fields.is_empty() {
        return Some(parsed);
    }

    let mut projected = serde_json::Map::new();
    for field in fields {
        let value = parsed.get(&field).cloned().unwrap_or(serde_json::Value::Null);
        projected.insert(field, value);
    }
    Some(serde_json::Value::Object(projected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cache_entry::CacheEntryConfig;

    fn entry(post_body_id: Option<&str>, vary: Option<Vec<&str>>) -> CacheEntry {
        let config = CacheEntryConfig {
            pattern: "^/.*$".to_string(),
            post_body_id: post_body_id.map(str::to_string),
            vary_body_field_list: vary.map(|v| v.into_iter().map(str::to_string).collect()),
            ..CacheEntryConfig::default()
        };
        config.compile("test".to_string()).unwrap()
    }

    #[test]
    fn normalize_uri_no_query_is_unchanged() {
        assert_eq!(normalize_uri("/biz/yelp-sf"), "/biz/yelp-sf");
    }

    #[test]
    fn normalize_uri_sorts_params_regardless_of_input_order() {
        let a = normalize_uri("/happy/?k3=v2&k1=v6&k2=v1%2Cv20");
        let b = normalize_uri("/happy/?k2=v1%2Cv20&k1=v6&k3=v2");
        assert_eq!(a, b);
        assert_eq!(a, "/happy/?k1=v6&k2=v1%2Cv20&k3=v2");
    }

    #[test]
    fn normalize_body_projects_and_sorts_keys() {
        let cache_entry = entry(Some("id"), Some(vec!["region"]));
        let a = normalize_body(br#"{"id":1,"region":"sf","extra":"x"}"#, &cache_entry).unwrap();
        let b = normalize_body(br#"{"region":"sf","id":1}"#, &cache_entry).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"id":1,"region":"sf"}"#);
    }

    #[test]
    fn normalize_body_fills_missing_fields_with_null() {
        let cache_entry = entry(Some("id"), None);
        let value = normalize_body(br#"{"other":1}"#, &cache_entry).unwrap();
        assert_eq!(value, serde_json::json!({"id": null}));
    }

    #[test]
    fn normalize_body_empty_is_none() {
        let cache_entry = entry(None, None);
        assert!(normalize_body(b"", &cache_entry).is_none());
    }
}
