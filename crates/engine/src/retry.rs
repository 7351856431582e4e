//! Bounded retries with exponential backoff and jitter.
//!
//! Deciding what happens after a failure is a pure function of the attempts
//! consumed so far and the kind of failure ([`RetryPolicy::next_step()`]);
//! only the length of the wait is randomised.

use ferry_remote::error::ErrorKind as RemoteErrorKind;
use ferry_storage::error::ErrorKind as StorageErrorKind;
use rand::Rng;
use std::time::Duration;

/// What a failure means for the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Timeouts, rate limits, 5xx and connection failures.
    Transient,
    /// Not found, malformed or rejected requests.
    Permanent,
    /// Authentication or authorisation failures.
    Fatal,
}

/// Maps collaborator errors onto an [`Outcome`].
pub trait Classify {
    fn outcome(&self) -> Outcome;

    /// Server-suggested minimum wait before trying again.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Classify for RemoteErrorKind {
    fn outcome(&self) -> Outcome {
        if self.is_fatal() {
            Outcome::Fatal
        } else if self.is_retryable() {
            Outcome::Transient
        } else {
            Outcome::Permanent
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        RemoteErrorKind::retry_after(self)
    }
}

impl Classify for StorageErrorKind {
    fn outcome(&self) -> Outcome {
        if self.is_fatal() {
            Outcome::Fatal
        } else if self.is_retryable() {
            Outcome::Transient
        } else {
            Outcome::Permanent
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait, then try again.
    Retry,
    /// Transient failure, but the attempt budget is spent.
    Exhausted,
    /// Trying again cannot help this request.
    GiveUp,
    /// Stop the whole run.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per file, first attempt included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(5), max_delay: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    /// `attempts` counts every failed attempt so far, this one included.
    pub fn next_step(&self, attempts: u32, outcome: Outcome) -> Step {
        match outcome {
            Outcome::Fatal => Step::Abort,
            Outcome::Permanent => Step::GiveUp,
            Outcome::Transient if attempts >= self.max_attempts => Step::Exhausted,
            Outcome::Transient => Step::Retry,
        }
    }

    /// `base * 2^(attempt - 1)`, capped at the maximum delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1 << exponent).min(self.max_delay)
    }

    /// Backoff plus up to 25% jitter, never below a server-suggested wait.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..=0.25));
        let delay = (backoff + jitter).min(self.max_delay);
        match retry_after {
            Some(after) => delay.max(after),
            None => delay,
        }
    }
}
