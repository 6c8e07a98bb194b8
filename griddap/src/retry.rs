use std::{future::Future, time::Duration};

use log::warn;
use serde::Deserialize;

use crate::errors::{Error, Result};

/// How hard to try before giving up on a remote operation.
///
/// Only transient errors (see `Error::is_transient`) are retried. The delay before retry `n`
/// is `initial_delay_ms * multiplier^(n - 1)`, capped at `max_delay_ms`.
///
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,

    pub initial_delay_ms: u64,

    pub multiplier: f64,

    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never waits
    ///
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 0,
        }
    }

    /// A policy that retries `max_attempts - 1` times with a fixed delay
    ///
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay = delay.as_millis() as u64;
        Self {
            max_attempts,
            initial_delay_ms: delay,
            multiplier: 1.0,
            max_delay_ms: delay,
        }
    }

    /// Delay to wait after the given (1 based) failed attempt
    ///
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let delay = delay.min(self.max_delay_ms as f64).max(0.0);

        Duration::from_millis(delay as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(self.multiplier >= 1.0) {
            return Err(Error::Config("retry.multiplier must be at least 1".into()));
        }

        Ok(())
    }

    /// Run `operation` until it succeeds, fails with a non-transient error, or runs out of
    /// attempts.
    ///
    /// `what` describes the operation for log messages and for `Error::RetryExhausted`.
    ///
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    return Err(Error::RetryExhausted {
                        what: what.to_string(),
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay(attempt);
                    warn!("{what} failed (attempt {attempt} of {max_attempts}): {err}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
