//! Retry policy: bounded attempts, scheduled backoff with jitter, and a
//! retryability classifier. Holds no mutable state, so one policy can wrap any
//! number of concurrent operations.

use crate::config::RetryConfig;
use crate::error::Retryable;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delays: Vec<Duration>,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; it is raised to at least 1.
    pub fn new(max_attempts: u32, delays: Vec<Duration>, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays,
            max_jitter,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config
                .delays_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            Duration::from_millis(config.max_jitter_ms),
        )
    }

    /// Retries without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Vec::new(), Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay slept before `attempt` (1-based); the first attempt never waits.
    /// Attempts past the end of the schedule reuse its last entry.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.delays.is_empty() {
            return Duration::ZERO;
        }
        let index = ((attempt - 2) as usize).min(self.delays.len() - 1);
        self.delays[index]
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_delay(attempt) + random_delay(Duration::ZERO, self.max_jitter)
    }

    /// Run `op` using the error type's own classifier.
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.run_with(label, op, |err: &E| err.is_retryable()).await
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// `op` receives the 1-based attempt number. The last error is returned on exhaustion.
    pub async fn run_with<T, E, F, Fut, C>(&self, label: &str, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                debug!(label, attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = classify(&err);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        retryable,
                        error = %err,
                        "Attempt failed"
                    );
                    if !retryable || attempt >= self.max_attempts {
                        return Err(err);
                    }
                }
            }
            attempt += 1;
        }
    }
}

/// Uniform random duration in `[min, max]` at millisecond resolution.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    if max_ms <= min_ms {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}
