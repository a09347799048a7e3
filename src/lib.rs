#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::cache::{InMemoryTokenCache, TokenCache};
use crate::adapters::http::{HttpTransport, ReqwestTransport};
use crate::adapters::redis::{RedisClient, RedisTokenCache};
use crate::api::AppState;
use crate::config::{Config, TokenCacheKind};
use crate::services::fcm::FcmClient;
use crate::services::health_service::HealthService;
use crate::services::oauth::CacheBinding;
use std::sync::Arc;
use tokio::sync::watch;

/// Wires the transport, token cache and client described by `config`.
///
/// # Errors
/// Returns an error if the service account cannot be loaded, the HTTP client
/// cannot be built, Redis is unreachable or the client rejects the credentials.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let key = config.fcm.service_account()?;
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.fcm.http_timeout())?);

    let (cache, redis) = match config.token_cache.kind {
        TokenCacheKind::Memory => (Some(Arc::new(InMemoryTokenCache::new()) as Arc<dyn TokenCache>), None),
        TokenCacheKind::Redis => {
            let redis = RedisClient::new(&config.redis).await?;
            let cache: Arc<dyn TokenCache> = Arc::new(RedisTokenCache::new(Arc::clone(&redis)));
            (Some(cache), Some(redis))
        }
        TokenCacheKind::None => (None, None),
    };
    let binding = cache.map(|cache| CacheBinding { cache, key: config.token_cache.key.clone() });

    let options = config.fcm.client_options(&key, binding);
    tracing::info!(
        project_id = key.project_id().unwrap_or("<unset>"),
        token_cache = ?config.token_cache.kind,
        max_concurrent_connections = options.max_concurrent_connections.get(),
        max_concurrent_streams = options.max_concurrent_streams.get(),
        "FCM client configured"
    );
    let fcm = FcmClient::new(key, transport, options)?;

    Ok(AppState { fcm, health_service: HealthService::new(redis, config.health.clone()) })
}

/// Flips `shutdown_tx` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}
