use std::sync::Arc;

use super::cache_entry::CacheEntry;

/// Output of the cacheability evaluator (C3), `spec.md` §3/§4.3.
#[derive(Debug, Clone)]
pub struct CacheDecision {
    pub is_cacheable: bool,
    pub refresh_cache: bool,
    pub reason: Option<String>,
    pub cache_name: Option<String>,
    pub cache_entry: Option<Arc<CacheEntry>>,
}

impl CacheDecision {
    #[must_use]
    pub fn not_cacheable(reason: impl Into<String>) -> Self {
        Self {
            is_cacheable: false,
            refresh_cache: false,
            reason: Some(reason.into()),
            cache_name: None,
            cache_entry: None,
        }
    }

    /// A no-cache-header refresh (`spec.md` P8, S6): not a hit/miss
    /// lookup, but `cache_entry`/`cache_name` still carry through so C7/C8
    /// can derive keys and write the fresh upstream response back.
    #[must_use]
    pub fn refresh(reason: impl Into<String>, cache_name: String, cache_entry: Arc<CacheEntry>) -> Self {
        Self {
            is_cacheable: false,
            refresh_cache: true,
            reason: Some(reason.into()),
            cache_name: Some(cache_name),
            cache_entry: Some(cache_entry),
        }
    }

    #[must_use]
    pub fn cacheable(cache_name: String, cache_entry: Arc<CacheEntry>) -> Self {
        Self {
            is_cacheable: true,
            refresh_cache: false,
            reason: None,
            cache_name: Some(cache_name),
            cache_entry: Some(cache_entry),
        }
    }

    /// The string tag transcribed into the `Spectre-Cache-Status`
    /// header before a hit/miss/store outcome is known (`spec.md` I6,
    /// S6). Overwritten later by C7/C8 once the actual cache lookup
    /// outcome is known.
    #[must_use]
    pub fn initial_cache_status(&self) -> String {
        self.reason.clone().unwrap_or_default()
    }
}
