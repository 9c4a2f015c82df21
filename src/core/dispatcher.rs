//! Bounded retry loop with per-failure-class backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{ChatError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based),
    /// or `None` when `err` is not retried.
    ///
    /// Timeouts back off linearly, other transient network failures
    /// exponentially, and rate limits honor `Retry-After` before falling back
    /// to 5s, 10s, 15s.
    pub fn backoff(&self, attempt: u32, err: &ChatError) -> Option<Duration> {
        match err {
            ChatError::Timeout(_) => Some(Duration::from_secs(u64::from(attempt))),
            ChatError::TransientNetwork(_) => {
                Some(Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6)))
            }
            ChatError::RateLimited { retry_after, .. } => Some(
                retry_after.unwrap_or_else(|| Duration::from_secs(5 * u64::from(attempt))),
            ),
            _ => None,
        }
    }
}

/// Runs one logical request under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    policy: RetryPolicy,
    provider: String,
    cancel: Option<CancellationToken>,
}

impl Dispatcher {
    pub fn new(provider: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            policy,
            provider: provider.into(),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Call `attempt_fn` with the 1-based attempt number until it succeeds,
    /// fails with a non-retryable error, or the attempt budget runs out.
    pub async fn run<T, F, Fut>(&self, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(provider = %self.provider, attempt, max_attempts, "sending request");
            let err = match self.cancellable(attempt_fn(attempt)).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(provider = %self.provider, attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let Some(wait) = self.policy.backoff(attempt, &err) else {
                return Err(err);
            };

            if attempt >= max_attempts {
                warn!(provider = %self.provider, attempts = attempt, error = %err, "retry budget exhausted");
                return Err(ChatError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            warn!(
                provider = %self.provider,
                attempt,
                max_attempts,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "request failed; retrying"
            );
            self.cancellable(async {
                tokio::time::sleep(wait).await;
                Ok(())
            })
            .await?;
            attempt += 1;
        }
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ChatError::Cancelled),
                result = fut => result,
            },
            None => fut.await,
        }
    }
}

/// Parse a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
