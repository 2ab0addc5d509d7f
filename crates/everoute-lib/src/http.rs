//! Retrying HTTP access shared by every external lookup.
//!
//! - [`Transport`]: the wire seam; [`ReqwestTransport`] is the production
//!   implementation.
//! - [`RetryPolicy`]: attempt cap, exponential backoff and per-attempt timeout.
//! - [`RetryingClient`]: runs a GET through a transport under a policy and a
//!   cancellation token, decoding the JSON body on success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Raw response handed back by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Performs a single GET request without any retry logic.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse>;
}

/// [`Transport`] backed by an async `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client that identifies itself with `user_agent`.
    ///
    /// `timeout` bounds the whole exchange at the socket level; the retry
    /// loop applies its own per-attempt timeout on top.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(Error::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(TransportResponse::new(status, body.to_vec()))
    }
}

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least one.
    pub max_attempts: usize,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor applied per retry; values below 1.0 are treated as 1.0.
    pub multiplier: f64,
    /// Timeout for one attempt, independent of the retry loop.
    pub request_timeout: Duration,
}

impl RetryPolicy {
    /// Exponential policy doubling from `initial_backoff`.
    pub fn exponential(max_attempts: usize, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Delay to wait after the `failed_attempts`-th failure (1-based).
    pub fn delay_for_attempt(&self, failed_attempts: usize) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failed_attempts - 1).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()))
    }

    /// Largest attempt cap for which every backoff is longer than the one
    /// before it. Beyond it delays sit at `max_backoff`.
    pub fn growing_attempt_limit(&self) -> usize {
        const CEILING: usize = 64;
        let mut attempts = 2;
        while attempts < CEILING
            && self.delay_for_attempt(attempts) > self.delay_for_attempt(attempts - 1)
        {
            attempts += 1;
        }
        attempts
    }

    fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP GET with retries, timeouts and cancellation.
#[derive(Clone)]
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` and decode its JSON body.
    ///
    /// HTTP 429, 5xx, transport errors and per-attempt timeouts are retried
    /// with growing delays. Other statuses and undecodable bodies fail at
    /// once. Once the attempt cap is hit the last failure is reported as
    /// [`Error::ExternalUnavailable`]. Cancellation wins over any pending
    /// request or delay and yields [`Error::Cancelled`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let attempts = self.policy.attempts();
        let mut last_error: Option<Error> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.policy.delay_for_attempt(attempt - 1);
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.attempt(url) => outcome,
            };

            match outcome {
                Ok(response) => return decode(url, &response.body),
                Err(err) if err.is_transient() => {
                    warn!(url, attempt, error = %err, "transient failure");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::ExternalUnavailable {
            url: url.to_string(),
            attempts,
            reason: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// One bounded attempt, classified into success or error.
    async fn attempt(&self, url: &str) -> Result<TransportResponse> {
        let timeout = self.policy.request_timeout;
        let response = match tokio::time::timeout(timeout, self.transport.get(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    url: url.to_string(),
                    after: timeout,
                })
            }
        };

        let status = response.status;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| {
        debug!(url, error = %err, "undecodable response body");
        Error::Json(err)
    })
}
