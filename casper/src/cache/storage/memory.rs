use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use moka::{future::Cache, Expiry};

use crate::types::response::StoredResponse;

use super::{
    compression,
    record::{GetOutcome, PutRequest},
};

#[derive(Debug, Clone)]
struct Entry {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    surrogate_keys: Vec<String>,
    ttl: Duration,
}

struct TtlExpiry;

impl Expiry<String, Entry> for TtlExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process storage backend used when the `redis-storage` feature is
/// disabled, or as the in-process shim in front of any backend
/// (`spec.md` §4.5 "In-process shim"). Built on `moka`, the same crate
/// the teacher uses for its own in-memory cache manager.
#[derive(Clone)]
pub struct MemoryBackend {
    cache: Cache<String, Entry>,
    surrogate_index: Arc<Mutex<HashMap<String, HashSet<String>>>>,
    compression_threshold: usize,
    compression_level: u32,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new(max_capacity: u64, compression_threshold: usize, compression_level: u32) -> Self {
        let surrogate_index: Arc<Mutex<HashMap<String, HashSet<String>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let listener_index = Arc::clone(&surrogate_index);
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(TtlExpiry)
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
            compression_threshold,
            compression_level,
        }
    }

    pub async fn get(&self, key: &str) -> GetOutcome {
        match self.cache.get(key).await {
            Some(entry) => GetOutcome::Hit(StoredResponse {
                status: entry.status,
                headers: entry.headers.clone(),
                body: compression::decode(&entry.body).into(),
            }),
            None => GetOutcome::Miss,
        }
    }

    pub async fn store(&self, request: PutRequest) {
        let body = compression::encode(
            &request.response.body,
            self.compression_threshold,
            self.compression_level,
        );
        let entry = Entry {
            status: request.response.status,
            headers: request.response.headers.clone(),
            body,
            surrogate_keys: request.surrogate_keys.clone(),
            ttl: request.ttl,
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
        self.cache.insert(request.primary_key, entry).await;
    }

    pub async fn delete_by_surrogates(&self, surrogates: &[String]) -> u64 {
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
        let count = keys_to_remove.len() as u64;
        for key in keys_to_remove {
            self.cache.invalidate(&key).await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(body: &str) -> StoredResponse {
        StoredResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let backend = MemoryBackend::new(1000, 1024, 6);
        backend
            .store(PutRequest {
                primary_key: "k1".to_string(),
                surrogate_keys: vec!["ns|cache".to_string()],
                response: response(r#"{"name":"yelp"}"#),
                ttl: Duration::from_secs(60),
            })
            .await;
        let outcome = backend.get("k1").await;
        match outcome {
            GetOutcome::Hit(stored) => assert_eq!(stored.body.as_ref(), br#"{"name":"yelp"}"#),
            _ => panic!("expected hit"),
        }
    }

    #[tokio::test]
    async fn delete_by_surrogate_removes_entry() {
        let backend = MemoryBackend::new(1000, 1024, 6);
        backend
            .store(PutRequest {
                primary_key: "k1".to_string(),
                surrogate_keys: vec!["ns|cache|7".to_string()],
                response: response("body"),
                ttl: Duration::from_secs(60),
            })
            .await;
        let deleted = backend.delete_by_surrogates(&["ns|cache|7".to_string()]).await;
        assert_eq!(deleted, 1);
        assert!(matches!(backend.get("k1").await, GetOutcome::Miss));
    }

    #[tokio::test]
    async fn delete_by_one_surrogate_does_not_affect_sibling_key() {
        let backend = MemoryBackend::new(1000, 1024, 6);
        backend
            .store(PutRequest {
                primary_key: "k7".to_string(),
                surrogate_keys: vec!["ns|cache".to_string(), "ns|cache|7".to_string()],
                response: response("seven"),
                ttl: Duration::from_secs(60),
            })
            .await;
        backend
            .store(PutRequest {
                primary_key: "k8".to_string(),
                surrogate_keys: vec!["ns|cache".to_string(), "ns|cache|8".to_string()],
                response: response("eight"),
                ttl: Duration::from_secs(60),
            })
            .await;
        backend.delete_by_surrogates(&["ns|cache|7".to_string()]).await;
        assert!(matches!(backend.get("k7").await, GetOutcome::Miss));
        assert!(matches!(backend.get("k8").await, GetOutcome::Hit(_)));
    }
}
