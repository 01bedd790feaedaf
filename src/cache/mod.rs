//! Polymorphic read-through cache (spec §4.2).
//!
//! Modeled as a capability trait with three variants, dependency-injected
//! at startup based on `CACHE_BACKEND` — directly following the design note
//! in spec §9 ("Polymorphic cache... dependency-inject the concrete
//! instance at startup"). Values are opaque bytes; callers serialize.

mod memcache_backend;
mod moka_backend;
mod noop;

pub use memcache_backend::MemcacheCache;
pub use moka_backend::MokaCache;
pub use noop::NoopCache;

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn delete(&self, key: &str);
}

pub fn build(settings: &crate::config::Settings) -> std::sync::Arc<dyn Cache> {
    use crate::config::CacheBackend;
    use std::sync::Arc;

    match settings.cache_backend {
        CacheBackend::None => Arc::new(NoopCache),
        CacheBackend::Lru => Arc::new(MokaCache::new(2048, settings.cache_ttl_seconds)),
        CacheBackend::Memcache => Arc::new(MemcacheCache::new(
            &settings.memcache_host,
            settings.memcache_port,
            settings.memcache_timeout,
        )),
    }
}
