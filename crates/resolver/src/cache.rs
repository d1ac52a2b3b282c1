//! Cache-aside primitive backing every resolver.
//!
//! Content is treated as immutable for its TTL window, so a write race
//! between two concurrent misses is tolerated rather than prevented:
//! whichever `set_if_absent` lands first wins and the loser keeps using its
//! own fetched value. Store failures are logged and treated as a miss; they
//! never fail the surrounding resolution.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CacheError, ResolveError};

/// Freshness windows per content kind.
pub mod ttl {
    use std::time::Duration;

    const DAY: u64 = 60 * 60 * 24;

    pub const VIDEO: Duration = Duration::from_secs(10 * DAY);
    pub const BANGUMI: Duration = Duration::from_secs(10 * DAY);
    pub const OPUS: Duration = Duration::from_secs(10 * DAY);
    pub const AUDIO: Duration = Duration::from_secs(10 * DAY);
    pub const READ: Duration = Duration::from_secs(10 * DAY);
    pub const LIVE: Duration = Duration::from_secs(60 * 5);
    pub const REPLY: Duration = Duration::from_secs(60 * 25);
}

/// Key/value store with TTL and set-if-absent semantics.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key` unless a live entry already exists.
    /// Returns whether this write won.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process store: a locked map with lazy expiry on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<FxHashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if let Some((_, expires_at)) = entries.get(key)
            && *expires_at > now
        {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Drive the shared check/fetch/store flow for one JSON payload.
///
/// `fetch` runs only on a miss and must return an already shape-validated
/// payload; its value is used locally even when the subsequent
/// `set_if_absent` loses a race.
pub(crate) async fn cache_aside<F, Fut>(
    cache: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> Result<Value, ResolveError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, ResolveError>>,
{
    match cache.get(key).await {
        Ok(Some(bytes)) => match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                return Ok(value);
            }
            Err(e) => warn!(key, error = %e, "discarding undecodable cache entry"),
        },
        Ok(None) => {}
        Err(e) => warn!(key, error = %e, "cache read failed, treating as miss"),
    }

    let value = fetch().await?;

    match serde_json::to_vec(&value) {
        Ok(bytes) => {
            if let Err(e) = cache.set_if_absent(key, bytes, ttl).await {
                warn!(key, error = %e, "cache write failed");
            }
        }
        Err(e) => warn!(key, error = %e, "cache serialization failed"),
    }

    Ok(value)
}

/// Store an extra alias key for an already-fetched payload (e.g. the same
/// video under both `aid` and `bvid`).
pub(crate) async fn cache_alias(cache: &dyn CacheStore, key: &str, value: &Value, ttl: Duration) {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            if let Err(e) = cache.set_if_absent(key, bytes, ttl).await {
                warn!(key, error = %e, "cache write failed");
            }
        }
        Err(e) => warn!(key, error = %e, "cache serialization failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_if_absent_first_writer_wins() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        assert!(cache.set_if_absent("k", b"a".to_vec(), ttl).await.unwrap());
        assert!(!cache.set_if_absent("k", b"b".to_vec(), ttl).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let cache = MemoryCache::new();
        cache
            .set_if_absent("k", b"a".to_vec(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        // A new writer may claim the key again.
        assert!(
            cache
                .set_if_absent("k", b"b".to_vec(), Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();
        cache
            .set_if_absent("k", b"a".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_aside_skips_fetch_on_hit() {
        let cache = MemoryCache::new();
        let payload = json!({"code": 0, "data": {"id": 1}});
        cache
            .set_if_absent(
                "video:aid:1",
                serde_json::to_vec(&payload).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let got = cache_aside(&cache, "video:aid:1", ttl::VIDEO, || async {
            panic!("fetch must not run on a cache hit")
        })
        .await
        .unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn test_cache_aside_fetches_and_stores_on_miss() {
        let cache = MemoryCache::new();
        let got = cache_aside(&cache, "live:6", ttl::LIVE, || async {
            Ok(json!({"code": 0}))
        })
        .await
        .unwrap();
        assert_eq!(got, json!({"code": 0}));
        assert!(cache.get("live:6").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cache_aside_propagates_fetch_error() {
        let cache = MemoryCache::new();
        let err = cache_aside(&cache, "video:aid:2", ttl::VIDEO, || async {
            Err(ResolveError::shape("u", "missing data"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::UpstreamShape { .. }));
        assert!(cache.get("video:aid:2").await.unwrap().is_none());
    }
}
