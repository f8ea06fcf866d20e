//! Retry policy for structured completions.
//!
//! A [`RetryPolicy`] is a plain value built per call (or copied from the
//! client default) and consumed by exactly one orchestration call. Each
//! attempt's result is classified into an [`AttemptOutcome`], and the loop
//! in [`CompletionClient`](crate::CompletionClient) dispatches on that tag.

use crate::error::AiError;
use std::time::Duration;

/// Default number of additional attempts after the first
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default pause before each retry
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pause inserted between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Constant(Duration),
    /// `initial * multiplier^attempt`, capped at `max`
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after the failed attempt with index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Constant(delay) => delay,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                if secs.is_finite() && secs < max.as_secs_f64() {
                    Duration::from_secs_f64(secs.max(0.0))
                } else {
                    max
                }
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant(DEFAULT_RETRY_DELAY)
    }
}

/// Which failures consume retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryCondition {
    /// Every failure is retried: transport and validation alike
    #[default]
    AnyError,
    /// Only failures where [`AiError::is_retryable`] holds; others are fatal
    Transient,
}

/// Result of one attempt, tagged for the retry loop.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    RetryableFailure(AiError),
    FatalFailure(AiError),
}

impl<T> AttemptOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }
}

/// One attempt inside an orchestration call. Never outlives the call.
#[derive(Debug)]
pub struct Attempt<T> {
    /// Zero-based, at most `max_retries`
    pub index: u32,
    pub outcome: AttemptOutcome<T>,
}

/// Bounded retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
    retry_on: RetryCondition,
}

impl RetryPolicy {
    /// Two retries, one second apart, every failure retried
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            retry_on: RetryCondition::default(),
        }
    }

    /// A single attempt with no retry
    pub fn none() -> Self {
        Self::new().with_max_retries(0)
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Use a constant delay between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.backoff = Backoff::Constant(delay);
        self
    }

    /// Set the backoff schedule
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set which failures are retried
    pub fn with_retry_on(mut self, retry_on: RetryCondition) -> Self {
        self.retry_on = retry_on;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn retry_on(&self) -> RetryCondition {
        self.retry_on
    }

    /// Total attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Tag an attempt result for the retry loop
    pub fn classify<T>(&self, result: Result<T, AiError>) -> AttemptOutcome<T> {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(err) => match self.retry_on {
                RetryCondition::AnyError => AttemptOutcome::RetryableFailure(err),
                RetryCondition::Transient if err.is_retryable() => {
                    AttemptOutcome::RetryableFailure(err)
                }
                RetryCondition::Transient => AttemptOutcome::FatalFailure(err),
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
