//! Bounded retry with backoff
//!
//! One helper drives retries at both granularities of the pipeline: a single
//! message re-invoking its domain handler, and a whole flush cycle re-running
//! its sub-flushes.

use crate::error::{Result, TributaryError};
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retry delays
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Retry immediately
    None,

    /// Fixed delay between retries
    Fixed(Duration),

    /// Exponential: initial * 2^attempt (capped at max)
    Exponential { initial: Duration, max: Duration },
}

impl BackoffStrategy {
    /// Delay to wait after the failed attempt with index `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { initial, max } => {
                let multiplier = 2u32.saturating_pow(attempt);
                initial.saturating_mul(multiplier).min(*max)
            }
        }
    }
}

/// How many times to run an operation and how long to wait in between
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

/// Result of a retried operation together with the number of attempts made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Number of attempts that failed
    pub fn failures(&self) -> u32 {
        match self.result {
            Ok(_) => self.attempts.saturating_sub(1),
            Err(_) => self.attempts,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Run `operation` until it succeeds, the attempts are exhausted or it fails
/// with a permanent error.
///
/// `operation` receives the 0-based attempt index. `on_failure` is called for
/// every failed attempt before any backoff delay. No delay follows the final
/// attempt.
pub async fn retry<T, F, Fut, O>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_failure: O,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    O: FnMut(u32, &TributaryError),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Err(err) => {
                on_failure(attempt, &err);

                let last = attempt + 1 >= max_attempts;
                if last || err.is_permanent() {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt + 1,
                    };
                }

                let delay = policy.backoff.delay(attempt);
                if !delay.is_zero() {
                    tracing::debug!(attempt, ?delay, "Backing off before retry");
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
