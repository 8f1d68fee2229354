use crate::{Cache, CoreError};
use async_trait::async_trait;
use moka::{Expiry, future::Cache as MokaCache};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory implementation of the Cache port using Moka.
/// Suitable for testing and single-process mode.
///
/// The cache is unbounded: revocation markers and idempotency claims must
/// stay until their TTL runs out, so entries are never evicted for size.
#[derive(Clone, Debug)]
pub struct InMemoryCache {
    cache: MokaCache<String, Entry>,
    default_ttl: Duration,
}

impl InMemoryCache {
    pub fn new(default_ttl_seconds: u64) -> Self {
        let cache = MokaCache::builder().expire_after(PerEntryTtl).build();
        Self {
            cache,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    fn entry(&self, value: &[u8], ttl_seconds: Option<u64>) -> Entry {
        Entry {
            value: value.to_vec(),
            ttl: ttl_seconds.map(Duration::from_secs).unwrap_or(self.default_ttl),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(3600)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> Result<(), CoreError> {
        self.cache
            .insert(key.to_string(), self.entry(value, ttl_seconds))
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<bool, CoreError> {
        let entry = self.entry(value, ttl_seconds);
        let stored = self
            .cache
            .entry(key.to_string())
            .or_insert_with(async move { entry })
            .await;
        Ok(stored.is_fresh())
    }
}
