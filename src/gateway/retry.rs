//! Retry state machine for upstream calls.
//!
//! One chat request walks through
//!
//! ```text
//! Attempting(n) --success--> Succeeded
//!      |  \------fatal-----> FailedFatal
//!      | retryable
//!      v
//! n < max_retries ? Backoff(n, delay) --sleep--> Attempting(n + 1)
//!                 : FailedExhausted
//! ```
//!
//! Attempts are strictly sequential. The delay before attempt `n + 1` is
//! `base_delay * 2^n + jitter`, and there is never a sleep after the final
//! attempt.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};

/// Retry budget and backoff shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every retry after that.
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(300),
            max_jitter: Duration::from_millis(150),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential part of the delay after a failed `attempt` (0-based).
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Full delay after a failed `attempt`, with `jitter` capped at
    /// `max_jitter`.
    pub fn backoff(&self, attempt: u32, jitter: Duration) -> Duration {
        self.base_backoff(attempt)
            .saturating_add(jitter.min(self.max_jitter))
    }
}

/// Source of backoff jitter.
pub trait JitterSource: Send + Sync {
    /// A jitter value in `[0, max)`; zero when `max` is zero.
    fn jitter(&self, max: Duration) -> Duration;
}

/// Uniformly random jitter with millisecond resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn jitter(&self, max: Duration) -> Duration {
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }
}

/// Always the same jitter, for deterministic delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn jitter(&self, max: Duration) -> Duration {
        self.0.min(max)
    }
}

/// Classified result of one attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    /// Transient failure; the string is the reason logged and, if this was
    /// the last attempt, surfaced as the detail.
    Retryable(String),
    Fatal(GatewayError),
}

/// States of one request's retry loop.
#[derive(Debug)]
pub enum RetryState<T> {
    Attempting {
        attempt: u32,
    },
    Backoff {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    Succeeded(T),
    FailedFatal(GatewayError),
    FailedExhausted {
        attempts: u32,
        last_error: String,
    },
}

impl<T> RetryState<T> {
    pub fn start() -> Self {
        Self::Attempting { attempt: 0 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded(_) | Self::FailedFatal(_) | Self::FailedExhausted { .. }
        )
    }

    /// Transition out of `Attempting { attempt }` given its outcome.
    pub fn after_attempt(
        attempt: u32,
        outcome: AttemptOutcome<T>,
        policy: &RetryPolicy,
        jitter: &dyn JitterSource,
    ) -> Self {
        match outcome {
            AttemptOutcome::Success(value) => Self::Succeeded(value),
            AttemptOutcome::Fatal(err) => Self::FailedFatal(err),
            AttemptOutcome::Retryable(reason) => {
                if attempt + 1 < policy.max_attempts() {
                    let delay = policy.backoff(attempt, jitter.jitter(policy.max_jitter));
                    Self::Backoff {
                        attempt,
                        delay,
                        reason,
                    }
                } else {
                    Self::FailedExhausted {
                        attempts: attempt + 1,
                        last_error: reason,
                    }
                }
            }
        }
    }
}

/// Drive `operation` through the retry state machine until a terminal state.
///
/// `operation(attempt)` performs one attempt (0-based) and classifies it.
pub async fn run_with_retry<T, Op, Fut>(
    policy: &RetryPolicy,
    jitter: &dyn JitterSource,
    mut operation: Op,
) -> Result<T>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut state = RetryState::start();
    loop {
        state = match state {
            RetryState::Attempting { attempt } => {
                let outcome = operation(attempt).await;
                RetryState::after_attempt(attempt, outcome, policy, jitter)
            }
            RetryState::Backoff {
                attempt,
                delay,
                reason,
            } => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Upstream attempt failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            RetryState::Succeeded(value) => return Ok(value),
            RetryState::FailedFatal(err) => {
                debug!(error = %err, "Upstream failure is fatal, not retrying");
                return Err(err);
            }
            RetryState::FailedExhausted {
                attempts,
                last_error,
            } => {
                warn!(attempts, reason = %last_error, "Upstream retries exhausted");
                return Err(GatewayError::UpstreamUnavailable {
                    attempts,
                    detail: last_error,
                });
            }
        };
    }
}
