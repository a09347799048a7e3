use super::error::{PushError, Result};
use super::retry::RetryPolicy;
use crate::adapters::http::{CONTENT_TYPE_JSON, HttpRequest, HttpResponse, HttpTransport};
use crate::domain::target::SendRequest;
use crate::domain::{Message, Target};
use crate::services::oauth::AccessToken;
use backon::Retryable;
use bytes::Bytes;
use opentelemetry::{global, metrics::Counter};
use serde::Deserialize;
use std::sync::Arc;

const INVALID_TOKEN_MESSAGE: &str = "not a valid FCM registration token";
const ENTITY_NOT_FOUND_MESSAGE: &str = "Requested entity was not found";
const UNREGISTERED_ERROR_CODE: &str = "UNREGISTERED";

#[derive(Clone, Debug)]
struct Metrics {
    retries: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fcm-relay");
        Self {
            retries: meter
                .u64_counter("push_retries_total")
                .with_description("Total number of send attempts retried after a server error")
                .build(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// Turns a non-2xx answer from the messaging endpoint into a [`PushError`].
///
/// Only device tokens can be unregistered; a 404 for a topic is an ordinary failure.
pub(crate) fn classify(target: &Target, response: &HttpResponse) -> PushError {
    let error = serde_json::from_slice::<ErrorEnvelope>(&response.body).ok().and_then(|e| e.error);
    let message = match &error {
        Some(body) if !body.message.is_empty() => body.message.clone(),
        _ => String::from_utf8_lossy(&response.body).trim().to_string(),
    };
    let message = if message.is_empty() { "Unknown error".to_string() } else { message };

    if response.is_server_error() {
        return PushError::Transient { status: response.status, message };
    }

    if matches!(target, Target::Token(_)) {
        let unregistered_code = error.as_ref().is_some_and(|body| {
            body.details.iter().any(|d| d.error_code.as_deref() == Some(UNREGISTERED_ERROR_CODE))
        });
        let unregistered = match response.status {
            400 => message.contains(INVALID_TOKEN_MESSAGE),
            404 => message.contains(ENTITY_NOT_FOUND_MESSAGE) || unregistered_code,
            _ => false,
        };
        if unregistered {
            return PushError::Unregistered;
        }
    }

    PushError::Http { status: response.status, message }
}

/// Delivers one message to one target.
#[derive(Debug)]
pub struct MessageSender {
    transport: Arc<dyn HttpTransport>,
    fcm_host: String,
    retry: RetryPolicy,
    metrics: Metrics,
}

impl MessageSender {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, fcm_host: impl Into<String>, retry: RetryPolicy) -> Self {
        let fcm_host = fcm_host.into().trim_end_matches('/').to_string();
        Self { transport, fcm_host, retry, metrics: Metrics::new() }
    }

    #[must_use]
    pub fn endpoint(&self, project_id: &str) -> String {
        format!("{}/v1/projects/{project_id}/messages:send", self.fcm_host)
    }

    /// Sends with linear backoff on server errors.
    ///
    /// # Errors
    /// Returns `PushError::Unregistered` for an invalid device token, `PushError::Http`
    /// for any other rejection (including exhausted retries) and `PushError::Transport`
    /// if no response was received.
    #[tracing::instrument(level = "debug", skip_all, fields(target = %target))]
    pub async fn send(&self, target: &Target, message: &Message, project_id: &str, token: &AccessToken) -> Result<()> {
        self.send_with(self.retry, target, message, project_id, token).await
    }

    /// Sends exactly once.
    ///
    /// # Errors
    /// Same as [`MessageSender::send`], without retrying server errors.
    #[tracing::instrument(level = "debug", skip_all, fields(target = %target))]
    pub async fn send_once(
        &self,
        target: &Target,
        message: &Message,
        project_id: &str,
        token: &AccessToken,
    ) -> Result<()> {
        self.send_with(RetryPolicy::none(), target, message, project_id, token).await
    }

    async fn send_with(
        &self,
        policy: RetryPolicy,
        target: &Target,
        message: &Message,
        project_id: &str,
        token: &AccessToken,
    ) -> Result<()> {
        let url = self.endpoint(project_id);
        let body = Bytes::from(
            serde_json::to_vec(&SendRequest::new(target, message))
                .map_err(|e| PushError::Validation(format!("Message cannot be encoded: {e}")))?,
        );

        let url = url.as_str();
        let body = &body;
        let metrics = &self.metrics;

        (|| async move { self.attempt(url, body, target, token).await })
            .retry(policy)
            .when(PushError::is_transient)
            .notify(|e, delay| {
                metrics.retries.add(1, &[]);
                tracing::warn!(error = %e, retry_in = ?delay, "Server error, retrying...");
            })
            .await
            .map_err(|e| {
                let e = e.into_terminal();
                if e.is_unregistered() {
                    tracing::info!("Unregistered device token for {target}");
                } else {
                    tracing::error!(error = %e, "Error sending request to {target}");
                }
                e
            })
    }

    async fn attempt(&self, url: &str, body: &Bytes, target: &Target, token: &AccessToken) -> Result<()> {
        let request = HttpRequest {
            url: url.to_string(),
            bearer_token: Some(token.secret().to_string()),
            content_type: CONTENT_TYPE_JSON,
            body: body.clone(),
        };

        let response = self.transport.execute(request).await.map_err(PushError::Transport)?;
        if response.is_success() {
            return Ok(());
        }
        Err(classify(target, &response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::testing::{ScriptedTransport, json_response, provider_error};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn token() -> AccessToken {
        AccessToken::new("ya29.test", None)
    }

    fn device(name: &str) -> Target {
        Target::Token(name.to_string())
    }

    fn sender(transport: &Arc<ScriptedTransport>) -> MessageSender {
        MessageSender::new(transport.clone(), "https://fcm.example.test/", RetryPolicy::default())
    }

    #[test]
    fn test_classify_invalid_token_is_unregistered() {
        let response = provider_error(400, "The registration token is not a valid FCM registration token");
        assert!(classify(&device("t"), &response).is_unregistered());
    }

    #[test]
    fn test_classify_not_found_is_unregistered_for_tokens_only() {
        let response = provider_error(404, "Requested entity was not found.");
        assert!(classify(&device("t"), &response).is_unregistered());
        assert!(matches!(
            classify(&Target::Topic("news".into()), &response),
            PushError::Http { status: 404, .. }
        ));
    }

    #[test]
    fn test_classify_unregistered_error_code() {
        let response = json_response(
            404,
            &json!({ "error": { "message": "Not found", "details": [{ "errorCode": "UNREGISTERED" }] } }),
        );
        assert!(classify(&device("t"), &response).is_unregistered());
    }

    #[test]
    fn test_classify_other_client_errors_are_generic() {
        let response = provider_error(400, "Invalid JSON payload received.");
        let err = classify(&device("t"), &response);
        assert_eq!(err.to_string(), "HTTP error! status: 400, message: Invalid JSON payload received.");

        let bare = HttpResponse { status: 401, body: Bytes::new() };
        assert_eq!(classify(&device("t"), &bare).to_string(), "HTTP error! status: 401, message: Unknown error");
    }

    #[test]
    fn test_classify_server_errors_are_transient() {
        assert!(classify(&device("t"), &provider_error(503, "unavailable")).is_transient());
        assert!(classify(&device("t"), &HttpResponse { status: 500, body: Bytes::from("oops") }).is_transient());
    }

    #[tokio::test]
    async fn test_request_shape() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| Ok(json_response(200, &json!({ "name": "m/1" })))));
        let message = Message::notification("Hello", "World");

        sender(&transport).send(&device("abc"), &message, "demo", &token()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://fcm.example.test/v1/projects/demo/messages:send");
        assert_eq!(requests[0].bearer_token.as_deref(), Some("ya29.test"));
        assert_eq!(requests[0].content_type, CONTENT_TYPE_JSON);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            json!({ "message": { "token": "abc", "notification": { "title": "Hello", "body": "World" } } })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_server_errors_then_success() {
        let transport = Arc::new(ScriptedTransport::new(|_, n| {
            Ok(if n < 3 { provider_error(503, "unavailable") } else { json_response(200, &json!({})) })
        }));

        let start = Instant::now();
        let result = sender(&transport).send(&device("abc"), &Message::notification("t", "b"), "demo", &token()).await;

        assert!(result.is_ok());
        assert_eq!(transport.request_count(), 4);
        // 1s + 2s + 3s of backoff on the paused clock.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_server_errors_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| Ok(provider_error(503, "unavailable"))));

        let start = Instant::now();
        let err = sender(&transport)
            .send(&device("abc"), &Message::notification("t", "b"), "demo", &token())
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Http { status: 503, .. }));
        assert_eq!(transport.request_count(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| {
            Ok(provider_error(400, "The registration token is not a valid FCM registration token"))
        }));

        let err = sender(&transport)
            .send(&device("stale"), &Message::notification("t", "b"), "demo", &token())
            .await
            .unwrap_err();

        assert!(err.is_unregistered());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_send_once_does_not_retry_server_errors() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| Ok(provider_error(500, "internal"))));

        let err = sender(&transport)
            .send_once(&Target::Topic("news".into()), &Message::notification("t", "b"), "demo", &token())
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Http { status: 500, .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| Err(anyhow::anyhow!("connection reset"))));

        let err = sender(&transport)
            .send(&device("abc"), &Message::notification("t", "b"), "demo", &token())
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Transport(_)));
        assert_eq!(transport.request_count(), 1);
    }
}
