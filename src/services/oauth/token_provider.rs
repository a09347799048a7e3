use super::signer::{ASSERTION_TTL_SECS, AssertionClaims, sign_assertion};
use crate::adapters::cache::TokenCache;
use crate::adapters::http::{CONTENT_TYPE_FORM, HttpRequest, HttpTransport};
use crate::domain::ServiceAccountKey;
use crate::services::fcm::error::{PushError, Result};
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

// Form-encoded `urn:ietf:params:oauth:grant-type:jwt-bearer`.
const JWT_BEARER_GRANT: &str = "urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer";

/// Subtracted from the assertion lifetime when caching, to absorb clock skew
/// and requests that are in flight when the token expires.
pub const CACHE_SAFETY_MARGIN_SECS: i64 = 60;

/// A bearer token. Cheap to clone; shared read-only by every send of one call.
#[derive(Clone)]
pub struct AccessToken {
    value: Arc<str>,
    expires_at: Option<OffsetDateTime>,
}

impl AccessToken {
    #[must_use]
    pub fn new(value: impl Into<Arc<str>>, expires_at: Option<OffsetDateTime>) -> Self {
        Self { value: value.into(), expires_at }
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Known only for freshly minted tokens; cached tokens rely on the cache TTL.
    #[must_use]
    pub const fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken").field("expires_at", &self.expires_at).finish_non_exhaustive()
    }
}

/// A cache handle together with the key the token is stored under.
#[derive(Debug, Clone)]
pub struct CacheBinding {
    pub cache: Arc<dyn TokenCache>,
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug)]
pub struct AccessTokenProvider {
    credentials: Arc<ServiceAccountKey>,
    transport: Arc<dyn HttpTransport>,
    token_uri: String,
    cache: Option<CacheBinding>,
}

impl AccessTokenProvider {
    #[must_use]
    pub const fn new(
        credentials: Arc<ServiceAccountKey>,
        transport: Arc<dyn HttpTransport>,
        token_uri: String,
        cache: Option<CacheBinding>,
    ) -> Self {
        Self { credentials, transport, token_uri, cache }
    }

    /// Returns a cached token when one is available, otherwise mints a new one.
    ///
    /// Overlapping calls on a cold cache may each mint a token; every minted
    /// token is valid and the last cache write wins.
    ///
    /// # Errors
    /// Returns `PushError::Credential` if signing fails, `PushError::TokenAcquisition`
    /// on a non-2xx answer from the token endpoint, `PushError::TokenResponse` if the
    /// answer cannot be parsed and `PushError::Transport` if the endpoint is unreachable.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn access_token(&self) -> Result<AccessToken> {
        if let Some(binding) = &self.cache
            && let Some(token) = Self::read_cache(binding).await
        {
            tracing::debug!("Using cached access token");
            return Ok(AccessToken::new(token, None));
        }

        let token = self.mint().await?;

        if let Some(binding) = &self.cache {
            Self::write_cache(binding, token.secret()).await;
        }

        Ok(token)
    }

    async fn mint(&self) -> Result<AccessToken> {
        let now = OffsetDateTime::now_utc();
        let claims = AssertionClaims::new(&self.credentials.client_email, &self.token_uri, now.unix_timestamp());
        let assertion =
            sign_assertion(&claims, &self.credentials.private_key, self.credentials.private_key_id.as_deref())?;

        let request = HttpRequest {
            url: self.token_uri.clone(),
            bearer_token: None,
            content_type: CONTENT_TYPE_FORM,
            // The assertion is base64url segments joined by dots; no escaping needed.
            body: Bytes::from(format!("grant_type={JWT_BEARER_GRANT}&assertion={assertion}")),
        };

        let response = self.transport.execute(request).await.map_err(PushError::Transport)?;
        if !response.is_success() {
            tracing::error!(status = response.status, "Token endpoint rejected the assertion");
            return Err(PushError::TokenAcquisition { status: response.status });
        }

        let parsed: TokenResponse =
            serde_json::from_slice(&response.body).map_err(|e| PushError::TokenResponse(e.to_string()))?;

        let lifetime = parsed.expires_in.unwrap_or(ASSERTION_TTL_SECS);
        tracing::info!(expires_in = lifetime, "Minted new access token");
        Ok(AccessToken::new(parsed.access_token, Some(now + time::Duration::seconds(lifetime))))
    }

    async fn read_cache(binding: &CacheBinding) -> Option<String> {
        match binding.cache.get(&binding.key).await {
            Ok(Some(token)) if !token.is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                tracing::error!(error = %e, "Error retrieving cached access token");
                None
            }
        }
    }

    async fn write_cache(binding: &CacheBinding, token: &str) {
        let ttl = Duration::from_secs((ASSERTION_TTL_SECS - CACHE_SAFETY_MARGIN_SECS).unsigned_abs());
        if let Err(e) = binding.cache.put(&binding.key, token, ttl).await {
            tracing::error!(error = %e, "Error caching access token");
        }
    }
}
