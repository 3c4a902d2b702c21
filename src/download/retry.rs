//! Retry handling for the transient receive error.
//!
//! Exactly one failure class is worth repeating: the connection dropping
//! while the body is being received ([`TransferErrorKind::Recv`]). Everything
//! else is reported to the caller as-is.
//!
//! [`retry_transient`] is the single combinator both the file and memory
//! paths run through. It takes the operation (an [`Attempt`]), a classifier
//! mapping each error to a [`FailureType`] (normally [`classify_error`]), and
//! a [`RetryPolicy`] carrying the budget.
//!
//! # Example
//!
//! ```
//! use fwdl_core::download::{classify_error, DownloadError, FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::with_budget(1);
//! let error = DownloadError::invalid_url("not a url");
//! assert_eq!(classify_error(&error), FailureType::Permanent);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { attempt, .. } => println!("retrying as attempt {attempt}"),
//!     RetryDecision::DoNotRetry { reason } => println!("not retrying: {reason}"),
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, instrument, warn};

use super::error::DownloadError;

/// Classification of transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The transient receive error. May succeed on retry.
    Transient,
    /// Anything that will fail the same way again.
    Permanent,
    /// The cancellation signal ended the transfer.
    Cancelled,
}

/// Decision on whether to run another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run another attempt after `delay`.
    Retry {
        /// How long to wait first.
        delay: Duration,
        /// Number of the next attempt (1-indexed, so the first retry is 2).
        attempt: u32,
    },
    /// Stop and report the last error.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry budget and pacing.
///
/// `budget` counts *extra* attempts: a budget of 0 means a single attempt,
/// a budget of 2 means up to three. The default delay is zero, so a retry
/// reissues the request straight away.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    budget: u32,
    delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(budget: u32, delay: Duration) -> Self {
        Self { budget, delay }
    }

    #[must_use]
    pub fn with_budget(budget: u32) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Maximum number of attempts including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.budget.saturating_add(1)
    }

    /// Decides what to do after `attempt` (1-indexed) failed with `failure_type`.
    #[instrument(level = "debug", skip(self), fields(budget = self.budget))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::Cancelled => {
                return RetryDecision::DoNotRetry {
                    reason: "cancellation signal is raised".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts() {
            debug!(attempt, "retry budget exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("retry budget ({}) exhausted", self.budget),
            };
        }

        RetryDecision::Retry {
            delay: self.delay_with_jitter(),
            attempt: attempt + 1,
        }
    }

    /// Configured delay plus up to a quarter of it as jitter. Zero stays zero.
    fn delay_with_jitter(&self) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        let max_jitter_ms = u64::try_from(self.delay.as_millis() / 4).unwrap_or(u64::MAX);
        let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter_ms);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

/// Classifies a download error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | `Transfer` with kind `Recv` | Transient |
/// | `Aborted` | Cancelled |
/// | everything else | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Transfer { kind, .. } if kind.is_transient() => FailureType::Transient,
        DownloadError::Aborted { .. } => FailureType::Cancelled,
        _ => FailureType::Permanent,
    }
}

/// One unit of retryable work.
#[async_trait]
pub trait Attempt: Send {
    type Output: Send;
    type Error: std::fmt::Display + Send;

    /// Runs attempt number `attempt` (1-indexed).
    async fn run(&mut self, attempt: u32) -> Result<Self::Output, Self::Error>;
}

/// Runs `op` until it succeeds, fails with an error `classify` does not call
/// transient, or the policy's budget is spent.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub async fn retry_transient<A, P>(
    policy: &RetryPolicy,
    op: &mut A,
    classify: P,
) -> Result<A::Output, A::Error>
where
    A: Attempt,
    P: Fn(&A::Error) -> FailureType + Send,
{
    let mut attempt = 1;
    loop {
        let error = match op.run(attempt).await {
            Ok(output) => return Ok(output),
            Err(error) => error,
        };
        let failure_type = classify(&error);
        match policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                warn!(attempt, next_attempt = next, %error, "transient failure, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt = next;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(attempt, ?failure_type, reason = %reason, "not retrying");
                return Err(error);
            }
        }
    }
}
