//! JSON-over-HTTP RPC transport shared by the proxy client and the remote jar.
//!
//! Each call is a `POST {base}/{Service}/{Method}` with a JSON body. The
//! channel owns connection-level behaviour only: dial retries with capped
//! exponential back-off and the per-call deadline. Application errors are
//! left to the callers.

use std::future::Future;
use std::time::{Duration, Instant};

use crawlkit_core::AppConfig;
use crawlkit_http::{HttpError, RequestMeta, Url};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Upper bound on the wait between two dial attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Connection settings for an [`RpcChannel`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Local transport timeout; the request deadline still applies on top.
    pub request_timeout: Duration,
    /// Total dial attempts, including the first one.
    pub max_dial_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub user_agent: String,
}

impl RpcConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(330),
            max_dial_attempts: 3,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            user_agent: "crawlkit/0.1 (dispatch)".to_owned(),
        }
    }

    /// Channel settings for `base_url` using the process configuration.
    #[must_use]
    pub fn from_app_config(config: &AppConfig, base_url: &str) -> Self {
        Self {
            base_url: base_url.to_owned(),
            connect_timeout: Duration::from_secs(config.rpc_connect_timeout_secs),
            request_timeout: Duration::from_secs(config.transport_timeout_secs),
            max_dial_attempts: config.rpc_max_dial_attempts,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: Duration::from_millis(config.rpc_max_backoff_ms),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// A handle to one RPC service endpoint. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RpcChannel {
    client: Client,
    base_url: Url,
    max_dial_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RpcChannel {
    /// Builds the channel. No connection is opened until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidArgument`] if `base_url` is not an
    /// `http(s)` URL, or [`HttpError::Transport`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(config: RpcConfig) -> Result<Self, HttpError> {
        // Exactly one trailing slash so `Url::join` appends instead of
        // replacing the last path segment.
        let normalised = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            HttpError::InvalidArgument(format!("invalid RPC base URL '{}': {e}", config.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(HttpError::InvalidArgument(format!(
                "RPC base URL '{}' must use http or https",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url,
            max_dial_attempts: config.max_dial_attempts.max(1),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Invokes `service/method` with `request` and decodes the JSON reply.
    ///
    /// # Errors
    ///
    /// - [`HttpError::Transport`] when the call cannot complete after all dial attempts.
    /// - [`HttpError::TransportStatus`] when the endpoint answers non-2xx.
    /// - [`HttpError::DeadlineExceeded`] when `meta.deadline` passes first.
    /// - [`HttpError::Deserialize`] when the reply is not the expected JSON.
    pub async fn call<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
        meta: &RequestMeta,
    ) -> Result<Resp, HttpError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(service, method)?;

        let body = within_deadline(
            meta.deadline,
            dial_with_backoff(
                self.max_dial_attempts,
                self.initial_backoff,
                self.max_backoff,
                || self.post_json(&url, request, meta),
            ),
        )
        .await?;

        serde_json::from_slice(&body).map_err(|source| HttpError::Deserialize {
            context: format!("{service}/{method} reply"),
            source,
        })
    }

    fn endpoint(&self, service: &str, method: &str) -> Result<Url, HttpError> {
        self.base_url
            .join(&format!("{service}/{method}"))
            .map_err(|e| HttpError::InvalidArgument(format!("invalid RPC path {service}/{method}: {e}")))
    }

    async fn post_json<Req>(
        &self,
        url: &Url,
        request: &Req,
        meta: &RequestMeta,
    ) -> Result<Vec<u8>, HttpError>
    where
        Req: Serialize + Sync,
    {
        let mut builder = self.client.post(url.clone()).json(request);
        if let Some(tracing_id) = meta.tracing_id.as_deref() {
            builder = builder.header("x-tracing-id", tracing_id);
        }
        if let Some(remaining) = meta.remaining(Instant::now()) {
            builder = builder.timeout(remaining);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::TransportStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Runs `fut`, giving up with [`HttpError::DeadlineExceeded`] at `deadline`.
///
/// # Errors
///
/// Propagates the future's own error, or `DeadlineExceeded`.
pub async fn within_deadline<T, Fut>(deadline: Option<Instant>, fut: Fut) -> Result<T, HttpError>
where
    Fut: Future<Output = Result<T, HttpError>>,
{
    let Some(deadline) = deadline else {
        return fut.await;
    };

    let started = Instant::now();
    let exceeded = || HttpError::DeadlineExceeded {
        after_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), fut).await {
        // The transport timeout is derived from the same deadline and may fire first.
        Ok(Err(HttpError::Transport(e))) if e.is_timeout() && Instant::now() >= deadline => {
            Err(exceeded())
        }
        Ok(result) => result,
        Err(_) => Err(exceeded()),
    }
}

/// `true` only when the TCP/TLS connection could not be established.
///
/// Anything past the dial (timeouts mid-call, HTTP statuses, bad JSON) may
/// already have reached the remote side and is never replayed here.
pub(crate) fn is_dial_failure(err: &HttpError) -> bool {
    matches!(err, HttpError::Transport(e) if e.is_connect())
}

/// Back-off before attempt `attempt + 1`: `initial * 2^(attempt-1)` with
/// ±25 % jitter, never above `max`.
pub(crate) fn backoff_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
    let base = initial.saturating_mul(factor).min(max);
    let jittered = base.mul_f64(rand::random::<f64>() * 0.5 + 0.75);
    jittered.min(max)
}

/// Runs `operation`, redialling on connection failures up to `max_attempts` in total.
pub(crate) async fn dial_with_backoff<T, F, Fut>(
    max_attempts: u32,
    initial: Duration,
    max: Duration,
    mut operation: F,
) -> Result<T, HttpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HttpError>>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_dial_failure(&err) || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = backoff_delay(initial, max, attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "RPC dial failed, redialling after back-off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
