use crate::adapters::cache::TokenCache;
use crate::adapters::redis::RedisClient;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

/// Token cache shared by every relay instance pointed at the same Redis.
#[derive(Debug, Clone)]
pub struct RedisTokenCache {
    redis: Arc<RedisClient>,
}

impl RedisTokenCache {
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.redis.connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.redis.connection();
        // SET EX rejects a zero expiry.
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }
}
