use super::batch::plan_batches;
use super::error::{PushError, Result};
use super::retry::RetryPolicy;
use super::sender::MessageSender;
use crate::adapters::http::HttpTransport;
use crate::domain::credentials::DEFAULT_TOKEN_URI;
use crate::domain::{Message, ServiceAccountKey, Target};
use crate::services::oauth::{AccessToken, AccessTokenProvider, CacheBinding};
use futures::future::join_all;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

pub const DEFAULT_FCM_HOST: &str = "https://fcm.googleapis.com";
pub const DEFAULT_MAX_CONCURRENT_CONNECTIONS: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => unreachable!(),
};
pub const DEFAULT_MAX_CONCURRENT_STREAMS: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    errors: Counter<u64>,
    unregistered: Counter<u64>,
    fanout_duration_seconds: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fcm-relay");
        Self {
            sent: meter
                .u64_counter("push_sent_total")
                .with_description("Total number of push notifications accepted by the provider")
                .build(),
            errors: meter
                .u64_counter("push_errors_total")
                .with_description("Total number of push notification delivery errors")
                .build(),
            unregistered: meter
                .u64_counter("push_unregistered_tokens_total")
                .with_description("Total number of device tokens reported as unregistered")
                .build(),
            fanout_duration_seconds: meter
                .f64_histogram("push_fanout_duration_seconds")
                .with_description("Time taken to deliver one message to a list of tokens")
                .build(),
        }
    }
}

/// Fan-out and delivery settings, fixed for the lifetime of a client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound on the number of batches sent in parallel.
    pub max_concurrent_connections: NonZeroUsize,
    /// Minimum number of targets per batch.
    pub max_concurrent_streams: NonZeroUsize,
    pub fcm_host: String,
    pub token_uri: String,
    pub retry: RetryPolicy,
    pub token_cache: Option<CacheBinding>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_concurrent_connections: DEFAULT_MAX_CONCURRENT_CONNECTIONS,
            max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
            fcm_host: DEFAULT_FCM_HOST.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            retry: RetryPolicy::default(),
            token_cache: None,
        }
    }
}

/// A failed delivery that was neither successful nor an unregistered token.
#[derive(Debug)]
pub struct TargetFailure {
    pub token: String,
    pub error: PushError,
}

/// Outcome of a multi-token send. Failed targets appear in no particular order.
#[derive(Debug, Default)]
pub struct MulticastReport {
    pub success_count: usize,
    pub unregistered_tokens: Vec<String>,
    pub failures: Vec<TargetFailure>,
}

impl MulticastReport {
    fn merge(&mut self, other: Self) {
        self.success_count += other.success_count;
        self.unregistered_tokens.extend(other.unregistered_tokens);
        self.failures.extend(other.failures);
    }
}

#[derive(Debug)]
struct Inner {
    credentials: Arc<ServiceAccountKey>,
    token_provider: AccessTokenProvider,
    sender: MessageSender,
    max_concurrent_connections: NonZeroUsize,
    max_concurrent_streams: NonZeroUsize,
    metrics: Metrics,
}

/// Firebase Cloud Messaging client.
#[derive(Debug, Clone)]
pub struct FcmClient {
    inner: Arc<Inner>,
}

impl FcmClient {
    /// Creates a client from a service-account key.
    ///
    /// # Errors
    /// Returns `PushError::Credential` if the key has no client email or private key.
    pub fn new(credentials: ServiceAccountKey, transport: Arc<dyn HttpTransport>, options: ClientOptions) -> Result<Self> {
        if credentials.client_email.trim().is_empty() || credentials.private_key.trim().is_empty() {
            return Err(PushError::Credential("Please provide the service account JSON configuration file.".into()));
        }

        let credentials = Arc::new(credentials);
        let token_provider = AccessTokenProvider::new(
            Arc::clone(&credentials),
            Arc::clone(&transport),
            options.token_uri,
            options.token_cache,
        );
        let sender = MessageSender::new(transport, options.fcm_host, options.retry);

        Ok(Self {
            inner: Arc::new(Inner {
                credentials,
                token_provider,
                sender,
                max_concurrent_connections: options.max_concurrent_connections,
                max_concurrent_streams: options.max_concurrent_streams,
                metrics: Metrics::new(),
            }),
        })
    }

    /// Sends `message` to every token, returning which tokens are no longer registered.
    ///
    /// Individual delivery failures do not fail the call; they are logged and
    /// reported in [`MulticastReport::failures`].
    ///
    /// # Errors
    /// Returns `PushError::Validation` for an empty message or token list,
    /// `PushError::Credential` if the project id is unknown, and any error raised
    /// while obtaining the access token.
    #[tracing::instrument(skip(self, message, tokens), fields(tokens = tokens.len()), err)]
    pub async fn send_to_tokens(&self, message: &Message, tokens: &[String]) -> Result<MulticastReport> {
        validate_message(message)?;
        if tokens.is_empty() {
            return Err(PushError::Validation("Token array is required".into()));
        }

        let project_id: Arc<str> = Arc::from(self.project_id()?);
        let access_token = self.inner.token_provider.access_token().await?;

        let start = std::time::Instant::now();
        let report = self.fan_out(message, tokens, project_id, access_token).await;
        self.inner.metrics.fanout_duration_seconds.record(start.elapsed().as_secs_f64(), &[]);

        if !report.unregistered_tokens.is_empty() {
            tracing::info!(count = report.unregistered_tokens.len(), "Unregistered device tokens found");
        }
        tracing::info!(
            delivered = report.success_count,
            unregistered = report.unregistered_tokens.len(),
            failed = report.failures.len(),
            "Multicast finished"
        );
        Ok(report)
    }

    /// Legacy multi-token send; returns only the unregistered tokens.
    ///
    /// # Errors
    /// Same as [`FcmClient::send_to_tokens`].
    #[deprecated(note = "use send_to_tokens, send_to_token, send_to_topic or send_to_condition")]
    pub async fn send_multicast(&self, message: &Message, tokens: &[String]) -> Result<Vec<String>> {
        self.send_to_tokens(message, tokens).await.map(|report| report.unregistered_tokens)
    }

    /// Sends to a single registration token.
    ///
    /// # Errors
    /// Returns `PushError::Unregistered` if the provider no longer recognizes the token.
    pub async fn send_to_token(&self, message: &Message, token: &str) -> Result<()> {
        self.send(message, &Target::Token(token.to_string())).await
    }

    /// Sends to every device subscribed to `topic`.
    ///
    /// # Errors
    /// Returns `PushError::Validation` for a missing or malformed topic name.
    pub async fn send_to_topic(&self, message: &Message, topic: &str) -> Result<()> {
        self.send(message, &Target::Topic(topic.to_string())).await
    }

    /// Sends to every device matching a topic condition expression.
    ///
    /// # Errors
    /// Returns `PushError::Validation` for an empty condition.
    pub async fn send_to_condition(&self, message: &Message, condition: &str) -> Result<()> {
        self.send(message, &Target::Condition(condition.to_string())).await
    }

    /// Sends to one target with a single attempt; errors propagate to the caller.
    ///
    /// # Errors
    /// Returns the classified delivery error, or any validation, credential or
    /// token acquisition error.
    #[tracing::instrument(skip(self, message, target), fields(target = %target))]
    pub async fn send(&self, message: &Message, target: &Target) -> Result<()> {
        target.validate().map_err(|reason| PushError::Validation(reason.into()))?;
        validate_message(message)?;
        let project_id = self.project_id()?;
        let access_token = self.inner.token_provider.access_token().await?;

        match self.inner.sender.send_once(target, message, project_id, &access_token).await {
            Ok(()) => {
                self.inner.metrics.sent.add(1, &[]);
                Ok(())
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    fn project_id(&self) -> Result<&str> {
        self.inner.credentials.project_id().ok_or_else(|| {
            PushError::Credential("Unable to determine Firebase Project ID from service account file.".into())
        })
    }

    fn record_failure(&self, error: &PushError) {
        if error.is_unregistered() {
            self.inner.metrics.unregistered.add(1, &[]);
        } else {
            self.inner.metrics.errors.add(1, &[KeyValue::new("reason", error.reason())]);
        }
    }

    /// Runs every batch as its own task and waits for all of them.
    async fn fan_out(
        &self,
        message: &Message,
        tokens: &[String],
        project_id: Arc<str>,
        access_token: AccessToken,
    ) -> MulticastReport {
        let message = Arc::new(message.clone());
        let batches =
            plan_batches(tokens, self.inner.max_concurrent_connections, self.inner.max_concurrent_streams);
        tracing::debug!(batches = batches.len(), batch_size = batches.first().map_or(0, |b| b.len()), "Planned fan-out");

        let mut tasks = JoinSet::new();
        for (index, batch) in batches.into_iter().enumerate() {
            let client = self.clone();
            let message = Arc::clone(&message);
            let project_id = Arc::clone(&project_id);
            let access_token = access_token.clone();
            let batch = batch.to_vec();

            tasks.spawn(
                async move { client.process_batch(&message, batch, &project_id, &access_token).await }
                    .instrument(tracing::debug_span!("push_batch", index)),
            );
        }

        let mut report = MulticastReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.merge(outcome),
                Err(e) => tracing::error!(error = %e, "Error processing batch"),
            }
        }
        report
    }

    /// Sends to every token of one batch concurrently.
    async fn process_batch(
        &self,
        message: &Message,
        batch: Vec<String>,
        project_id: &str,
        access_token: &AccessToken,
    ) -> MulticastReport {
        let sends = batch.iter().map(|device| async move {
            let target = Target::Token(device.clone());
            self.inner.sender.send(&target, message, project_id, access_token).await
        });
        let results = join_all(sends).await;

        let mut outcome = MulticastReport::default();
        for (token, result) in batch.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    self.inner.metrics.sent.add(1, &[]);
                    outcome.success_count += 1;
                }
                Err(PushError::Unregistered) => {
                    self.inner.metrics.unregistered.add(1, &[]);
                    outcome.unregistered_tokens.push(token);
                }
                Err(error) => {
                    self.record_failure(&error);
                    outcome.failures.push(TargetFailure { token, error });
                }
            }
        }

        if !outcome.failures.is_empty() {
            tracing::error!(count = outcome.failures.len(), "Errors occurred while processing batch");
        }
        outcome
    }
}

fn validate_message(message: &Message) -> Result<()> {
    if message.is_empty() {
        return Err(PushError::Validation("Message is required".into()));
    }
    Ok(())
}
