//! Retry with exponential backoff
//!
//! Retries are modelled as an explicit state machine so the driving loop stays
//! trivial and the transitions can be tested without a clock:
//!
//! ```text
//! Idle ──start──▶ Attempting(1) ──ok──▶ Succeeded
//!                     │
//!                   error
//!                     ├── retryable and attempts left ──▶ Waiting(delay) ──resume──▶ Attempting(n+1)
//!                     └── otherwise ──▶ Failed
//! ```
//!
//! [`RetryPolicy::run`] drives the machine with `tokio::time::sleep`, so tests
//! can use a paused clock.

use crate::types::{AppError, Result};
use rand::Rng;
use regex::Regex;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

/// Buffer added on top of a provider's retry-after hint
const RETRY_AFTER_BUFFER: Duration = Duration::from_secs(1);

/// Message fragments that mark an untyped provider error as retryable
const RETRYABLE_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "quota",
    "timeout",
    "timed out",
    "overloaded",
    "resource exhausted",
    "resource_exhausted",
];

static RETRY_AFTER_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry[\s_-]*(?:after|in)\W*(\d+(?:\.\d+)?)\s*(?:s\b|sec|second)")
        .expect("retry-after pattern is valid")
});

static RETRY_DELAY_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#)
        .expect("retryDelay pattern is valid")
});

/// Backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for the computed delay
    pub max_delay: Duration,
    /// Relative jitter, 0.2 means ±20%
    pub jitter: f64,
    /// Ceiling for provider retry-after hints
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            max_retry_after: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Un-jittered delay before the `retry`-th retry (1-based)
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay for `retry` with the jitter factor drawn by the caller.
    ///
    /// `unit` is a sample in [0, 1]; 0 maps to the lower jitter bound and 1 to
    /// the upper one.
    pub fn jittered_delay(&self, retry: u32, unit: f64) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = 1.0 - jitter + 2.0 * jitter * unit.clamp(0.0, 1.0);
        self.nominal_delay(retry).mul_f64(factor)
    }

    /// Delay before the next attempt after `error`.
    ///
    /// A retry-after hint from the provider wins over the computed backoff.
    pub fn delay_for(&self, retry: u32, error: &AppError) -> Duration {
        if let Some(hint) = retry_after_hint(error) {
            return (hint + RETRY_AFTER_BUFFER).min(self.max_retry_after);
        }
        let unit: f64 = rand::rng().random_range(0.0..=1.0);
        self.jittered_delay(retry, unit)
    }

    /// Run `operation` under this policy.
    ///
    /// The closure receives the 1-based attempt number. Non-retryable errors
    /// are returned immediately; retryable ones are retried until
    /// `max_attempts` is reached and the last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut machine = RetryMachine::new(self.clone());
        let mut attempt = machine.start();

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    machine.on_success();
                    if attempt > 1 {
                        tracing::info!(analyzer = label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => match machine.on_failure(&error) {
                    RetryState::Waiting { delay, .. } => {
                        tracing::warn!(
                            analyzer = label,
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retryable analyzer failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = machine.resume();
                    }
                    _ => {
                        tracing::warn!(
                            analyzer = label,
                            attempt,
                            retryable = is_retryable(&error),
                            error = %error,
                            "Analyzer call failed"
                        );
                        return Err(error);
                    }
                },
            }
        }
    }
}

/// Retry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, retryable: bool },
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded { .. } | RetryState::Failed { .. })
    }
}

/// Transition logic for one retried operation
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Idle → Attempting(1). Returns the attempt number.
    pub fn start(&mut self) -> u32 {
        self.state = RetryState::Attempting { attempt: 1 };
        1
    }

    /// Attempting → Succeeded
    pub fn on_success(&mut self) {
        if let RetryState::Attempting { attempt } = self.state {
            self.state = RetryState::Succeeded { attempts: attempt };
        }
    }

    /// Attempting → Waiting or Failed
    pub fn on_failure(&mut self, error: &AppError) -> RetryState {
        let RetryState::Attempting { attempt } = self.state else {
            return self.state;
        };

        let retryable = is_retryable(error);
        self.state = if retryable && attempt < self.policy.max_attempts {
            RetryState::Waiting {
                attempt,
                delay: self.policy.delay_for(attempt, error),
            }
        } else {
            RetryState::Failed {
                attempts: attempt,
                retryable,
            }
        };
        self.state
    }

    /// Waiting → Attempting(n+1). Returns the new attempt number.
    pub fn resume(&mut self) -> u32 {
        match self.state {
            RetryState::Waiting { attempt, .. } => {
                self.state = RetryState::Attempting {
                    attempt: attempt + 1,
                };
                attempt + 1
            }
            RetryState::Attempting { attempt } => attempt,
            _ => self.start(),
        }
    }
}

/// Whether an error is worth retrying.
///
/// Typed transient errors always are; untyped provider errors are when their
/// message carries a rate-limit, quota or timeout signal. Auth, schema and
/// input errors never are.
pub fn is_retryable(error: &AppError) -> bool {
    match error {
        AppError::Transient { .. } => true,
        AppError::LLM(message) => {
            let lowered = message.to_lowercase();
            RETRYABLE_MARKERS.iter().any(|m| lowered.contains(m))
        }
        _ => false,
    }
}

/// Parse an explicit "retry after N seconds" hint out of a provider message
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let captures = RETRY_DELAY_JSON
        .captures(message)
        .or_else(|| RETRY_AFTER_TEXT.captures(message))?;
    let seconds: f64 = captures.get(1)?.as_str().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

fn retry_after_hint(error: &AppError) -> Option<Duration> {
    match error {
        AppError::Transient {
            retry_after: Some(hint),
            ..
        } => Some(*hint),
        AppError::Transient { message, .. } | AppError::LLM(message) => parse_retry_after(message),
        _ => None,
    }
}
