use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use moka::future::Cache;

use crate::types::response::StoredResponse;

use super::record::{GetOutcome, PutRequest};

const DEFAULT_SHIM_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct Entry {
    status: u16,
    headers: Vec<(String, String)>,
    body: bytes::Bytes,
    surrogate_keys: Vec<String>,
}

/// Small in-process cache fronting the configured backend, per `spec.md`
/// §4.5 "In-process shim": a tiny LRU with a configured max byte size and
/// a short, fixed TTL. Per-process, single-owner; cross-worker
/// invalidation still relies on the real backend.
#[derive(Clone)]
pub struct Shim {
    cache: Cache<String, Entry>,
    surrogate_index: Arc<Mutex<HashMap<String, HashSet<String>>>>,
}

impl std::fmt::Debug for Shim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shim")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl Shim {
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self::with_ttl(max_bytes, DEFAULT_SHIM_TTL)
    }

    #[must_use]
    pub fn with_ttl(max_bytes: u64, ttl: Duration) -> Self {
        let surrogate_index: Arc<Mutex<HashMap<String, HashSet<String>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let listener_index = Arc::clone(&surrogate_index);
        let cache = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key, value: &Entry| {
                u32::try_from(value.body.len()).unwrap_or(u32::MAX)
            })
            .time_to_live(ttl)
            .eviction_listener(move |key: Arc<String>, value: Entry, _cause| {
                let mut index = listener_index.lock().unwrap_or_else(|e| e.into_inner());
                for surrogate in &value.surrogate_keys {
                    if let Some(set) = index.get_mut(surrogate) {
                        set.remove(key.as_str());
                        if set.is_empty() {
                            index.remove(surrogate);
                        }
                    }
                }
            })
            .build();
        Self {
            cache,
            surrogate_index,
        }
    }

    pub async fn get(&self, key: &str) -> Option<StoredResponse> {
        self.cache.get(key).await.map(|entry| StoredResponse {
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
        })
    }

    pub async fn put(&self, request: &PutRequest) {
        let entry = Entry {
            status: request.response.status,
            headers: request.response.headers.clone(),
            body: request.response.body.clone(),
            surrogate_keys: request.surrogate_keys.clone(),
        };
        {
            let mut index = self
                .surrogate_index
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for surrogate in &request.surrogate_keys {
                index
                    .entry(surrogate.clone())
                    .or_default()
                    .insert(request.primary_key.clone());
            }
        }
        self.cache.insert(request.primary_key.clone(), entry).await;
    }

    pub async fn evict_by_surrogates(&self, surrogates: &[String]) {
        let mut keys_to_remove: HashSet<String> = HashSet::new();
        {
            let mut index = self
                .surrogate_index
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for surrogate in surrogates {
                if let Some(set) = index.remove(surrogate) {
                    keys_to_remove.extend(set);
                }
            }
        }
        for key in keys_to_remove {
            self.cache.invalidate(&key).await;
        }
    }
}

/// Wraps a raw backend outcome as a shim hit for call sites that need a
/// [`GetOutcome`] rather than an `Option`.
#[must_use]
pub fn as_outcome(hit: Option<StoredResponse>) -> GetOutcome {
    match hit {
        Some(response) => GetOutcome::Hit(response),
        None => GetOutcome::Miss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn request(key: &str, surrogate: &str) -> PutRequest {
        PutRequest {
            primary_key: key.to_string(),
            surrogate_keys: vec![surrogate.to_string()],
            response: StoredResponse {
                status: 200,
                headers: Vec::new(),
                body: bytes::Bytes::from_static(b"{}"),
            },
            ttl: StdDuration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn put_then_get_hits() {
        let shim = Shim::new(1_000_000);
        shim.put(&request("k1", "ns|cache")).await;
        assert!(shim.get("k1").await.is_some());
    }

    #[tokio::test]
    async fn evict_by_surrogate_clears_entry() {
        let shim = Shim::new(1_000_000);
        shim.put(&request("k1", "ns|cache|7")).await;
        shim.evict_by_surrogates(&["ns|cache|7".to_string()]).await;
        assert!(shim.get("k1").await.is_none());
    }
}
