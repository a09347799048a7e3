use crate::domain::ServiceAccountKey;
use crate::services::fcm::client::{DEFAULT_FCM_HOST, DEFAULT_MAX_CONCURRENT_CONNECTIONS, DEFAULT_MAX_CONCURRENT_STREAMS};
use crate::services::fcm::{ClientOptions, RetryPolicy};
use crate::services::oauth::CacheBinding;
use anyhow::Context;
use clap::{Args, Parser, ValueEnum};
use std::num::NonZeroUsize;
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub fcm: FcmConfig,

    #[command(flatten)]
    pub token_cache: TokenCacheConfig,

    #[command(flatten)]
    pub redis: RedisConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "FCM_RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "FCM_RELAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Seconds to wait for in-flight requests during shutdown
    #[arg(long, env = "FCM_RELAY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct FcmConfig {
    /// Service account key as inline JSON
    #[arg(long, env = "FCM_SERVICE_ACCOUNT_JSON", hide_env_values = true)]
    pub service_account_json: Option<String>,

    /// Path to the service account key file
    #[arg(long, env = "FCM_SERVICE_ACCOUNT_FILE")]
    pub service_account_file: Option<String>,

    /// Overrides the project id found in the service account key
    #[arg(long, env = "FIREBASE_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Upper bound on the number of batches sent in parallel
    #[arg(long, env = "FCM_MAX_CONCURRENT_CONNECTIONS", default_value_t = DEFAULT_MAX_CONCURRENT_CONNECTIONS)]
    pub max_concurrent_connections: NonZeroUsize,

    /// Minimum number of tokens per batch
    #[arg(long, env = "FCM_MAX_CONCURRENT_STREAMS", default_value_t = DEFAULT_MAX_CONCURRENT_STREAMS)]
    pub max_concurrent_streams: NonZeroUsize,

    /// Base URL of the messaging endpoint
    #[arg(long, env = "FCM_HOST", default_value = DEFAULT_FCM_HOST)]
    pub fcm_host: String,

    /// OAuth2 token endpoint (defaults to the one named in the service account key)
    #[arg(long, env = "FCM_TOKEN_URI")]
    pub token_uri: Option<String>,

    /// Retries after a server error when sending to a token list
    #[arg(long, env = "FCM_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Delay before the first retry; the n-th retry waits n times this
    #[arg(long, env = "FCM_RETRY_BASE_DELAY_MS", default_value_t = 1000)]
    pub retry_base_delay_ms: u64,

    /// Timeout for a single outbound HTTP request
    #[arg(long, env = "FCM_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,
}

impl FcmConfig {
    /// Loads the service account key, preferring inline JSON over a file path.
    ///
    /// # Errors
    /// Returns an error if neither source is set or the key cannot be parsed.
    pub fn service_account(&self) -> anyhow::Result<ServiceAccountKey> {
        let key = match (&self.service_account_json, &self.service_account_file) {
            (Some(raw), _) => {
                ServiceAccountKey::from_json(raw).context("FCM_SERVICE_ACCOUNT_JSON is not a valid service account")?
            }
            (None, Some(path)) => ServiceAccountKey::from_file(path)
                .with_context(|| format!("Failed to load service account file {path}"))?,
            (None, None) => {
                anyhow::bail!("Please provide the service account JSON configuration file.")
            }
        };

        Ok(match &self.project_id {
            Some(project_id) if !project_id.is_empty() => key.with_project_id(project_id),
            _ => key,
        })
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_retries: self.max_retries, base_delay: Duration::from_millis(self.retry_base_delay_ms) }
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Client options for `key`, with the given token cache.
    #[must_use]
    pub fn client_options(&self, key: &ServiceAccountKey, token_cache: Option<CacheBinding>) -> ClientOptions {
        ClientOptions {
            max_concurrent_connections: self.max_concurrent_connections,
            max_concurrent_streams: self.max_concurrent_streams,
            fcm_host: self.fcm_host.clone(),
            token_uri: self.token_uri.clone().unwrap_or_else(|| key.token_uri.clone()),
            retry: self.retry_policy(),
            token_cache,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TokenCacheKind {
    #[default]
    Memory,
    Redis,
    None,
}

#[derive(Clone, Debug, Args)]
pub struct TokenCacheConfig {
    /// Where access tokens are cached between sends
    #[arg(long = "token-cache", env = "FCM_TOKEN_CACHE", value_enum, default_value_t = TokenCacheKind::Memory)]
    pub kind: TokenCacheKind,

    /// Cache key under which the access token is stored
    #[arg(long = "token-cache-key", env = "FCM_TOKEN_CACHE_KEY", default_value = "fcm:access_token")]
    pub key: String,
}

#[derive(Clone, Debug, Args)]
pub struct RedisConfig {
    /// Redis connection URL, used when the token cache is `redis`
    #[arg(long = "redis-url", env = "FCM_REDIS_URL", default_value = "redis://localhost:6379")]
    pub url: String,

    /// Minimum delay between connection attempts
    #[arg(long = "redis-min-backoff-secs", env = "FCM_REDIS_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    /// Maximum delay between connection attempts
    #[arg(long = "redis-max-backoff-secs", env = "FCM_REDIS_MAX_BACKOFF_SECS", default_value_t = 10)]
    pub max_backoff_secs: u64,

    /// Connection attempts before startup fails
    #[arg(long = "redis-connect-attempts", env = "FCM_REDIS_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: usize,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the Redis readiness check
    #[arg(long, env = "FCM_RELAY_HEALTH_REDIS_TIMEOUT_MS", default_value_t = 2000)]
    pub redis_timeout_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed per client IP
    #[arg(long = "rate-limit-per-second", env = "FCM_RELAY_RATE_LIMIT_PER_SECOND", default_value_t = 50)]
    pub per_second: u32,

    /// Burst allowance per client IP
    #[arg(long = "rate-limit-burst", env = "FCM_RELAY_RATE_LIMIT_BURST", default_value_t = 100)]
    pub burst: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "FCM_RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; telemetry export is disabled when unset
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
