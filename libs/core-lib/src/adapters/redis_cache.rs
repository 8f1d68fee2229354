use crate::{Cache, CoreError};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

/// Redis implementation of the Cache port using redis-rs.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    default_ttl_seconds: u64,
}

impl RedisCache {
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self, CoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoreError::Configuration(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        info!("Redis cache connected.");
        Ok(Self {
            connection,
            default_ttl_seconds,
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        conn.set_ex(key, value, ttl)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        conn.del(key)
            .await
            .map(|_: usize| ())
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<bool, CoreError> {
        let mut conn = self.connection.clone();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        // SET .. NX replies OK when stored and nil when the key exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        Ok(reply.is_some())
    }
}

// --- Integration Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use testcontainers::ContainerAsync;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::redis::Redis as RedisImage;
    use tokio::time::sleep;

    async fn setup_redis() -> (RedisCache, ContainerAsync<RedisImage>) {
        let node = RedisImage::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = node
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get host port");
        let cache = RedisCache::new(&format!("redis://localhost:{}/", port), 3600)
            .await
            .expect("Failed to connect to testcontainer Redis");
        (cache, node)
    }

    #[tokio::test]
    async fn test_set_get_delete_redis() {
        let (cache, _node) = setup_redis().await;

        cache.set("k", b"v", None).await.expect("SET failed");
        assert_eq!(cache.get("k").await.expect("GET failed"), Some(b"v".to_vec()));

        cache.delete("k").await.expect("DEL failed");
        assert_eq!(cache.get("k").await.expect("GET failed"), None);
    }

    #[tokio::test]
    async fn test_set_with_ttl_redis() {
        let (cache, _node) = setup_redis().await;
        cache.set("ttl", b"v", Some(1)).await.expect("SET failed");
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(cache.get("ttl").await.expect("GET failed"), None);
    }

    #[tokio::test]
    async fn test_set_if_absent_redis() {
        let (cache, _node) = setup_redis().await;
        assert!(cache.set_if_absent("claim", b"a", Some(60)).await.unwrap());
        assert!(!cache.set_if_absent("claim", b"b", Some(60)).await.unwrap());
        assert_eq!(cache.get("claim").await.unwrap(), Some(b"a".to_vec()));
    }
}
