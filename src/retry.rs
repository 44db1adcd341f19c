//! # Deadline and Retry Module
//!
//! Races operations against a timer and retries them with a fixed pause.
//!
//! [`with_deadline`] is the single timeout primitive of the crate: the health
//! probe, connection teardown and inbound events go through it. When the
//! timer wins, the operation's future is dropped and its result discarded.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryPolicy;

/// Outcome of an operation raced against a deadline
#[derive(Debug, Clone, PartialEq)]
pub enum Deadline<T> {
    Completed(T),
    TimedOut,
}

impl<T> Deadline<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Deadline::Completed(value) => Some(value),
            Deadline::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Deadline::TimedOut)
    }
}

/// Run `operation`, giving up after `limit`
pub async fn with_deadline<F>(limit: Duration, operation: F) -> Deadline<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(value) => Deadline::Completed(value),
        Err(_) => Deadline::TimedOut,
    }
}

/// All attempts of a retried operation failed
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: anyhow::Error,
}

impl std::fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gave up after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl std::error::Error for RetryExhausted {}

/// Retry `operation` under `policy`, each attempt bounded by the attempt timeout
///
/// Every failure is retried the same way, whatever its cause.
pub async fn retry_with_deadline<F, Fut, T>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    retry_with_deadline_if(policy, |_| true, operation).await
}

/// Like [`retry_with_deadline`], but an error rejected by `is_retryable` ends the
/// loop immediately
///
/// Timeouts are always retryable.
pub async fn retry_with_deadline_if<F, Fut, T, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    R: Fn(&anyhow::Error) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match with_deadline(policy.attempt_timeout, operation()).await {
            Deadline::Completed(Ok(value)) => return Ok(value),
            Deadline::Completed(Err(e)) if !is_retryable(&e) => {
                warn!(attempt, error = %e, "Operation failed permanently");
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Deadline::Completed(Err(e)) => e,
            Deadline::TimedOut => anyhow::anyhow!(
                "attempt timed out after {}ms",
                policy.attempt_timeout.as_millis()
            ),
        };

        let attempts_left = max_attempts - attempt;
        warn!(attempt, attempts_left, error = %error, "Operation failed");

        if attempts_left == 0 {
            return Err(RetryExhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        tokio::time::sleep(policy.retry_delay).await;
    }
}
