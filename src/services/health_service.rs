use crate::adapters::redis::RedisClient;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fcm-relay");
        Self {
            status: meter
                .i64_gauge("fcm_relay_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    redis: Option<Arc<RedisClient>>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    /// `redis` is the token cache backend, if the relay uses one.
    #[must_use]
    pub fn new(redis: Option<Arc<RedisClient>>, config: HealthConfig) -> Self {
        Self { redis, config, metrics: Metrics::new() }
    }

    /// Whether readiness depends on a Redis connection.
    #[must_use]
    pub const fn has_redis(&self) -> bool {
        self.redis.is_some()
    }

    /// Checks Redis connectivity. Succeeds trivially when Redis is not in use.
    ///
    /// # Errors
    /// Returns a string describing the failure if Redis is unreachable.
    pub async fn check_redis(&self) -> Result<(), String> {
        let Some(redis) = &self.redis else {
            return Ok(());
        };
        let redis_timeout = Duration::from_millis(self.config.redis_timeout_ms);

        match timeout(redis_timeout, redis.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "redis")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "redis")]);
                Err(format!("Redis connection failed: {e:?}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "redis")]);
                Err("Redis connection timed out".to_string())
            }
        }
    }
}
