use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::Cache;

/// Remote shared cache backed by the `memcache` crate (pinned the same way
/// `RockBanzai-vSMTP` depends on `memcache = { version = "0.17.0" }`).
/// Every call is blocking network I/O, so it is pushed onto
/// `tokio::task::spawn_blocking` to avoid head-of-line blocking the async
/// executor (spec §4.2).
pub struct MemcacheCache {
    client: Arc<Mutex<Option<memcache::Client>>>,
}

impl MemcacheCache {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let url = format!("memcache://{host}:{port}?timeout={}", timeout.as_secs().max(1));
        let client = memcache::Client::connect(url.as_str()).ok();
        Self {
            client: Arc::new(Mutex::new(client)),
        }
    }
}

#[async_trait]
impl Cache for MemcacheCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let client = self.client.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let guard = client.lock().unwrap();
            guard.as_ref()?.get::<Vec<u8>>(&key).ok().flatten()
        })
        .await
        .ok()
        .flatten()
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let client = self.client.clone();
        let key = key.to_string();
        let ttl_secs = ttl.as_secs() as u32;
        let _ = tokio::task::spawn_blocking(move || {
            let guard = client.lock().unwrap();
            if let Some(c) = guard.as_ref() {
                let _ = c.set(&key, value.as_slice(), ttl_secs);
            }
        })
        .await;
    }

    async fn delete(&self, key: &str) {
        let client = self.client.clone();
        let key = key.to_string();
        let _ = tokio::task::spawn_blocking(move || {
            let guard = client.lock().unwrap();
            if let Some(c) = guard.as_ref() {
                let _ = c.delete(&key);
            }
        })
        .await;
    }
}

