pub mod compression;
pub mod memory;
#[cfg(feature = "redis-storage")]
pub mod redis_backend;
pub mod record;
pub mod shim;

use std::{sync::Arc, time::Duration};

use crate::types::response::StoredResponse;

pub use record::{encode_key, GetOutcome, PutRequest, StorageError};

const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
const DEFAULT_MEMORY_CAPACITY: u64 = 100_000;
const DEFAULT_SHIM_MAX_BYTES: u64 = 16 * 1024 * 1024;

/// The concrete storage backend selected at startup, mirroring the
/// teacher's `CacheClient` split between a Redis-backed and an
/// in-process manager (`ai-gateway/src/cache.rs`).
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(memory::MemoryBackend),
    #[cfg(feature = "redis-storage")]
    Redis(redis_backend::RedisBackend),
}

impl Backend {
    pub async fn get(&self, key: &str) -> GetOutcome {
        match self {
            Self::Memory(backend) => backend.get(key).await,
            #[cfg(feature = "redis-storage")]
            Self::Redis(backend) => backend.get(key).await,
        }
    }

    pub async fn store(&self, request: PutRequest) {
        match self {
            Self::Memory(backend) => backend.store(request).await,
            #[cfg(feature = "redis-storage")]
            Self::Redis(backend) => backend.store(request).await,
        }
    }

    pub async fn delete_by_surrogates(&self, surrogates: &[String]) -> Result<u64, StorageError> {
        match self {
            Self::Memory(backend) => Ok(backend.delete_by_surrogates(surrogates).await),
            #[cfg(feature = "redis-storage")]
            Self::Redis(backend) => backend.delete_by_surrogates(surrogates).await,
        }
    }

    /// `GET /status?check_backend=true` (`spec.md` §4.10): the
    /// in-process backend is always healthy; a Redis backend is pinged.
    pub async fn health_check(&self) -> bool {
        match self {
            Self::Memory(_) => true,
            #[cfg(feature = "redis-storage")]
            Self::Redis(backend) => backend.ping().await,
        }
    }
}

/// Storage abstraction (C5, `spec.md` §4.5): an in-process TTL shim in
/// front of a pluggable backend. `get`/`store`/`delete_by_surrogates` are
/// safe to call concurrently; backend failures on `store` are logged,
/// never surfaced (invariant-adjacent to I4/I5).
#[derive(Debug, Clone)]
pub struct Storage {
    shim: shim::Shim,
    backend: Arc<Backend>,
}

impl Storage {
    #[must_use]
    pub fn new(backend: Backend, shim_max_bytes: u64) -> Self {
        Self {
            shim: shim::Shim::new(shim_max_bytes),
            backend: Arc::new(backend),
        }
    }

    /// In-process-only storage, used when no external backend is
    /// configured (or the `redis-storage` feature is disabled).
    #[must_use]
    pub fn in_process() -> Self {
        Self::new(
            Backend::Memory(memory::MemoryBackend::new(
                DEFAULT_MEMORY_CAPACITY,
                DEFAULT_COMPRESSION_THRESHOLD,
                DEFAULT_COMPRESSION_LEVEL,
            )),
            DEFAULT_SHIM_MAX_BYTES,
        )
    }

    #[cfg(feature = "redis-storage")]
    pub fn redis(url: &url::Url) -> Result<Self, StorageError> {
        let backend = redis_backend::RedisBackend::connect(
            url,
            DEFAULT_COMPRESSION_THRESHOLD,
            DEFAULT_COMPRESSION_LEVEL,
        )?;
        Ok(Self::new(Backend::Redis(backend), DEFAULT_SHIM_MAX_BYTES))
    }

    pub async fn get(&self, primary_key: &[String]) -> GetOutcome {
        let key = encode_key(primary_key);
        if let Some(hit) = self.shim.get(&key).await {
            return GetOutcome::Hit(hit);
        }
        self.backend.get(&key).await
    }

    pub async fn store(
        &self,
        primary_key: &[String],
        surrogate_keys: Vec<String>,
        response: StoredResponse,
        ttl: Duration,
    ) {
        let request = PutRequest {
            primary_key: encode_key(primary_key),
            surrogate_keys,
            response,
            ttl,
        };
        self.shim.put(&request).await;
        self.backend.store(request).await;
    }

    pub async fn delete_by_surrogates(&self, surrogates: &[String]) -> Result<u64, StorageError> {
        self.shim.evict_by_surrogates(surrogates).await;
        self.backend.delete_by_surrogates(surrogates).await
    }

    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }
}
