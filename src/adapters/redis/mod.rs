use crate::config::RedisConfig;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;

pub mod cache;

pub use cache::RedisTokenCache;

#[derive(Debug)]
pub struct RedisClient {
    connection: redis::aio::ConnectionManager,
}

impl RedisClient {
    /// Connects to Redis, retrying with exponential backoff while the server is unreachable.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or every connection attempt fails.
    pub async fn new(config: &RedisConfig) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(config.url.as_str())?;

        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(config.min_backoff_secs))
            .with_max_delay(Duration::from_secs(config.max_backoff_secs))
            .with_max_times(config.connect_attempts);

        let connection = (|| async { client.get_connection_manager().await })
            .retry(&retry_strategy)
            .notify(|e, duration| {
                tracing::warn!(error = %e, retry_in = ?duration, "Failed to connect to Redis, retrying...");
            })
            .await?;

        tracing::info!("Connected to Redis");
        Ok(Arc::new(Self { connection }))
    }

    /// Returns a connection handle for standard Redis commands.
    #[must_use]
    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.connection.clone()
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.connection();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
