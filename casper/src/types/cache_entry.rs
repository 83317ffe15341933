use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One entry in a destination's `cached_endpoints` map (`spec.md` §3).
///
/// `pattern`/`pattern_v2` are parsed once at config-load time and kept
/// as `Arc<Regex>` so cloning a `CacheEntry` (done once per matching
/// attempt in the evaluator) never re-compiles a regex.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub cache_name: String,
    #[serde(with = "regex_serde")]
    pub pattern: Arc<Regex>,
    #[serde(with = "opt_regex_serde")]
    pub pattern_v2: Option<Arc<Regex>>,
    pub ttl_seconds: u64,
    pub request_method: RequestMethod,
    pub bulk_support: bool,
    pub id_identifier: Option<String>,
    pub post_body_id: Option<String>,
    pub enable_id_extraction: bool,
    pub dont_cache_missing_ids: bool,
    pub vary_headers: Option<Vec<String>>,
    pub vary_body_field_list: Option<Vec<String>>,
    pub num_buckets: Option<u32>,
    pub uncacheable_headers: Option<Vec<String>>,
    pub use_filter: Option<String>,
}

impl CacheEntry {
    /// `pattern_v2 or pattern`, per the migration precedence this spec
    /// mandates (`spec.md` §9 open question #1).
    #[must_use]
    pub fn active_pattern(&self) -> &Regex {
        self.pattern_v2.as_deref().unwrap_or(&self.pattern)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    #[must_use]
    pub fn matches(self, method: &http::Method) -> bool {
        match self {
            Self::Get => *method == http::Method::GET,
            Self::Post => *method == http::Method::POST,
        }
    }
}

impl Default for RequestMethod {
    fn default() -> Self {
        Self::Get
    }
}

/// On-disk shape of a `CacheEntry`, as it appears nested under a
/// destination's `cached_endpoints` YAML mapping. Kept separate from
/// [`CacheEntry`] so regex compilation (and its failure mode) is
/// explicit at load time rather than silently deferred.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheEntryConfig {
    pub pattern: String,
    pub pattern_v2: Option<String>,
    pub ttl: u64,
    pub request_method: RequestMethod,
    pub bulk_support: bool,
    pub id_identifier: Option<String>,
    pub post_body_id: Option<String>,
    pub enable_id_extraction: bool,
    pub dont_cache_missing_ids: bool,
    pub vary_headers: Option<Vec<String>>,
    pub vary_body_field_list: Option<Vec<String>>,
    pub num_buckets: Option<u32>,
    pub uncacheable_headers: Option<Vec<String>>,
    pub use_filter: Option<String>,
}

impl Default for CacheEntryConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            pattern_v2: None,
            ttl: 60,
            request_method: RequestMethod::Get,
            bulk_support: false,
            id_identifier: None,
            post_body_id: None,
            enable_id_extraction: false,
            dont_cache_missing_ids: false,
            vary_headers: None,
            vary_body_field_list: None,
            num_buckets: None,
            uncacheable_headers: None,
            use_filter: None,
        }
    }
}

impl CacheEntryConfig {
    pub fn compile(&self, cache_name: String) -> Result<CacheEntry, regex::Error> {
        let pattern = Arc::new(Regex::new(&self.pattern)?);
        let pattern_v2 = self
            .pattern_v2
            .as_deref()
            .map(Regex::new)
            .transpose()?
            .map(Arc::new);
        Ok(CacheEntry {
            cache_name,
            pattern,
            pattern_v2,
            ttl_seconds: self.ttl,
            request_method: self.request_method,
            bulk_support: self.bulk_support,
            id_identifier: self.id_identifier.clone(),
            post_body_id: self.post_body_id.clone(),
            enable_id_extraction: self.enable_id_extraction,
            dont_cache_missing_ids: self.dont_cache_missing_ids,
            vary_headers: self.vary_headers.clone(),
            vary_body_field_list: self.vary_body_field_list.clone(),
            num_buckets: self.num_buckets,
            uncacheable_headers: self.uncacheable_headers.clone(),
            use_filter: self.use_filter.clone(),
        })
    }
}

mod regex_serde {
    use std::sync::Arc;

    use regex::Regex;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &Arc<Regex>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_str())
    }
}

mod opt_regex_serde {
    use std::sync::Arc;

    use regex::Regex;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &Option<Arc<Regex>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(r) => serializer.serialize_some(r.as_str()),
            None => serializer.serialize_none(),
        }
    }
}
