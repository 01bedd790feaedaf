use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaInner;

use super::Cache;

/// In-process LRU+TTL cache, grounded on `moka::future::Cache` the way
/// `penserai-acteon` depends on `moka = { version = "0.12", features =
/// ["future"] }`. Entries carry their own expiry instant so `set` can honor
/// a per-call TTL rather than only a cache-wide default; moka's own
/// capacity-bounded eviction (an approximate LRU/W-TinyLFU policy) handles
/// the "least-recently-used" side of the contract.
pub struct MokaCache {
    inner: MokaInner<String, (Vec<u8>, Instant)>,
}

impl MokaCache {
    pub fn new(max_capacity: u64, default_ttl_seconds: u64) -> Self {
        let inner = MokaInner::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(default_ttl_seconds.max(1)))
            .build();
        Self { inner }
    }
}

#[async_trait]
impl Cache for MokaCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let (value, expires_at) = self.inner.get(key).await?;
        if Instant::now() >= expires_at {
            self.inner.invalidate(key).await;
            return None;
        }
        Some(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.inner.insert(key.to_string(), (value, expires_at)).await;
    }

    async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_within_ttl() {
        let cache = MokaCache::new(10, 300);
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expires_past_ttl() {
        let cache = MokaCache::new(10, 300);
        cache.set("k", b"v".to_vec(), Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MokaCache::new(10, 300);
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }
}
