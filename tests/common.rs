#![allow(dead_code)]

use fcm_relay::adapters::cache::{InMemoryTokenCache, TokenCache};
use fcm_relay::adapters::http::ReqwestTransport;
use fcm_relay::adapters::redis::RedisClient;
use fcm_relay::api::{AppState, app_router};
use fcm_relay::config::{HealthConfig, RateLimitConfig, RedisConfig};
use fcm_relay::domain::ServiceAccountKey;
use fcm_relay::services::fcm::{ClientOptions, FcmClient, RetryPolicy};
use fcm_relay::services::health_service::HealthService;
use fcm_relay::services::oauth::CacheBinding;
use serde_json::json;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Once};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

pub const PROJECT_ID: &str = "demo-project";
pub const ACCESS_TOKEN: &str = "ya29.integration";
pub const PRIVATE_KEY: &str = include_str!("fixtures/test_rsa_key.pem");
pub const PUBLIC_KEY: &str = include_str!("fixtures/test_rsa_public.pem");

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("fcm_relay=debug".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub const fn send_path() -> &'static str {
    "/v1/projects/demo-project/messages:send"
}

pub fn service_account(token_uri: &str) -> ServiceAccountKey {
    let raw = json!({
        "type": "service_account",
        "project_id": PROJECT_ID,
        "private_key_id": "test-key-1",
        "private_key": PRIVATE_KEY,
        "client_email": "relay@demo-project.iam.gserviceaccount.com",
        "client_id": "1234567890",
        "token_uri": token_uri,
    });
    ServiceAccountKey::from_json(&raw.to_string()).unwrap()
}

/// Options pointing at `server` for both the token and messaging endpoints.
pub fn client_options(server: &MockServer) -> ClientOptions {
    ClientOptions {
        max_concurrent_connections: NonZeroUsize::new(4).unwrap(),
        max_concurrent_streams: NonZeroUsize::new(2).unwrap(),
        fcm_host: server.uri(),
        token_uri: format!("{}/token", server.uri()),
        retry: RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(10) },
        token_cache: None,
    }
}

pub fn build_client(server: &MockServer, options: ClientOptions) -> FcmClient {
    setup_tracing();
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    FcmClient::new(service_account(&format!("{}/token", server.uri())), transport, options).unwrap()
}

pub fn memory_cache() -> CacheBinding {
    let cache: Arc<dyn TokenCache> = Arc::new(InMemoryTokenCache::new());
    CacheBinding { cache, key: "fcm:access_token".into() }
}

/// Token endpoint that accepts a JWT bearer grant.
pub async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": 3599,
            "token_type": "Bearer",
        })))
        .mount(server)
        .await;
}

/// Messaging endpoint accepting every message.
pub async fn mount_send_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(send_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "projects/demo-project/messages/1" })))
        .mount(server)
        .await;
}

/// Messaging endpoint rejecting `token` as unregistered.
pub async fn mount_send_unregistered(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path(send_path()))
        .and(body_partial_json(json!({ "message": { "token": token } })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "Requested entity was not found.",
                "status": "NOT_FOUND",
                "details": [{ "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError", "errorCode": "UNREGISTERED" }]
            }
        })))
        .with_priority(1)
        .mount(server)
        .await;
}

/// Connects to the Redis named by `FCM_REDIS_URL`, or returns `None` when the
/// variable is unset so Redis-backed tests can be skipped.
pub async fn redis_from_env() -> Option<Arc<RedisClient>> {
    setup_tracing();
    let Ok(url) = std::env::var("FCM_REDIS_URL") else {
        tracing::warn!("FCM_REDIS_URL is not set, skipping Redis-backed test");
        return None;
    };
    let config = RedisConfig { url, min_backoff_secs: 1, max_backoff_secs: 1, connect_attempts: 1 };
    Some(RedisClient::new(&config).await.expect("FCM_REDIS_URL must point at a reachable Redis"))
}

/// A key no other test run will collide with.
pub fn unique_key(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
    format!("{prefix}:{}:{nanos}", std::process::id())
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub provider: MockServer,
}

impl TestApp {
    /// Serves the relay on an ephemeral port, backed by a mock provider.
    pub async fn spawn() -> Self {
        Self::spawn_with_rate_limit(RateLimitConfig { per_second: 10_000, burst: 10_000 }).await
    }

    pub async fn spawn_with_rate_limit(rate_limit: RateLimitConfig) -> Self {
        Self::spawn_with(rate_limit, HealthService::new(None, HealthConfig { redis_timeout_ms: 500 })).await
    }

    pub async fn spawn_with_health(health_service: HealthService) -> Self {
        Self::spawn_with(RateLimitConfig { per_second: 10_000, burst: 10_000 }, health_service).await
    }

    async fn spawn_with(rate_limit: RateLimitConfig, health_service: HealthService) -> Self {
        let provider = MockServer::start().await;
        mount_token_endpoint(&provider).await;

        let mut options = client_options(&provider);
        options.token_cache = Some(memory_cache());
        let fcm = build_client(&provider, options);

        let state = AppState { fcm, health_service };
        let router = app_router(state, &rate_limit);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
        });

        Self { address, client: reqwest::Client::new(), provider }
    }

    pub async fn post(&self, route: &str, body: serde_json::Value) -> reqwest::Response {
        self.client.post(format!("{}{route}", self.address)).json(&body).send().await.unwrap()
    }
}
