use async_trait::async_trait;
use std::time::Duration;

use super::Cache;

/// Always-miss cache for `CACHE_BACKEND=none`. A miss here simply falls
/// through to the store lookup — the cache is advisory, never authoritative.
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}
}
