use r2d2::Pool;
use redis::{Client, Commands};
use serde::{Deserialize, Serialize};

use crate::types::response::StoredResponse;

use super::{
    compression,
    record::{GetOutcome, PutRequest, StorageError},
};

#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

fn surrogate_set_key(surrogate: &str) -> String {
    format!("surrogate:{surrogate}")
}

fn pool_error(error: impl std::fmt::Display) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "connection pool", error.to_string()))
}

/// Redis-backed storage, mirroring the teacher's `RedisCacheManager`
/// pooling pattern. Each surrogate key is indexed by a Redis set of the
/// primary keys stored under it, enabling group delete.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    pool: Pool<Client>,
    compression_threshold: usize,
    compression_level: u32,
}

impl RedisBackend {
    pub fn connect(
        url: &url::Url,
        compression_threshold: usize,
        compression_level: u32,
    ) -> Result<Self, StorageError> {
        let client = Client::open(url.as_str()).map_err(|e| StorageError::Connection(e.to_string()))?;
        let pool = Pool::builder()
            .build(client)
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            pool,
            compression_threshold,
            compression_level,
        })
    }

    pub async fn get(&self, key: &str) -> GetOutcome {
        let pool = self.pool.clone();
        let key = key.to_string();
        let result = tokio::task::spawn_blocking(move || -> redis::RedisResult<Option<String>> {
            let mut conn = pool.get().map_err(pool_error)?;
            conn.get(&key)
        })
        .await;

        match result {
            Ok(Ok(Some(raw))) => match serde_json::from_str::<WireRecord>(&raw) {
                Ok(record) => GetOutcome::Hit(StoredResponse {
                    status: record.status,
                    headers: record.headers,
                    body: compression::decode(&record.body).into(),
                }),
                Err(error) => {
                    tracing::warn!(%error, "corrupt redis record, treating as storage error");
                    GetOutcome::Error
                }
            },
            Ok(Ok(None)) => GetOutcome::Miss,
            Ok(Err(error)) => {
                tracing::warn!(%error, "redis get failed");
                GetOutcome::Error
            }
            Err(error) => {
                tracing::warn!(%error, "redis get task panicked");
                GetOutcome::Error
            }
        }
    }

    pub async fn store(&self, request: PutRequest) {
        let body = compression::encode(
            &request.response.body,
            self.compression_threshold,
            self.compression_level,
        );
        let record = WireRecord {
            status: request.response.status,
            headers: request.response.headers.clone(),
            body,
        };
        let Ok(serialized) = serde_json::to_string(&record) else {
            tracing::warn!("failed to serialize record for redis store");
            return;
        };
        let pool = self.pool.clone();
        let ttl_secs = request.ttl.as_secs().max(1);
        let primary_key = request.primary_key;
        let surrogate_keys = request.surrogate_keys;

        let result = tokio::task::spawn_blocking(move || -> redis::RedisResult<()> {
            let mut conn = pool.get().map_err(pool_error)?;
            conn.set_ex::<_, _, ()>(&primary_key, serialized, ttl_secs)?;
            for surrogate in &surrogate_keys {
                conn.sadd::<_, _, ()>(surrogate_set_key(surrogate), &primary_key)?;
            }
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(%error, "redis store failed"),
            Err(error) => tracing::warn!(%error, "redis store task panicked"),
        }
    }

    /// `PING`s the pool for `GET /status?check_backend=true` (`spec.md`
    /// §4.10).
    pub async fn ping(&self) -> bool {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> redis::RedisResult<()> {
            let mut conn = pool.get().map_err(pool_error)?;
            redis::cmd("PING").query::<()>(&mut *conn)
        })
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    pub async fn delete_by_surrogates(&self, surrogates: &[String]) -> Result<u64, StorageError> {
        let pool = self.pool.clone();
        let surrogates = surrogates.to_vec();
        let result = tokio::task::spawn_blocking(move || -> redis::RedisResult<u64> {
            let mut conn = pool.get().map_err(pool_error)?;
            let mut total = 0u64;
            for surrogate in &surrogates {
                let set_key = surrogate_set_key(surrogate);
                let members: Vec<String> = conn.smembers(&set_key)?;
                if !members.is_empty() {
                    let _: () = conn.del(&members)?;
                    total += members.len() as u64;
                }
                let _: () = conn.del(&set_key)?;
            }
            Ok(total)
        })
        .await;

        match result {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(error)) => Err(StorageError::Connection(error.to_string())),
            Err(error) => Err(StorageError::Connection(error.to_string())),
        }
    }
}
