//! Retries for transient content-source failures.

use super::SourceError;
use std::time::Duration;
use tracing::{error, warn};

/// Fixed attempt count with exponential backoff between attempts.
///
/// With the defaults (3 attempts, 2s, ×2) a failing call sleeps 2s, then 4s,
/// then gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            backoff: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            backoff: 1,
        }
    }

    /// Sleep before retry number `attempt` (1-based: the wait after the first failure).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let backoff = self.delay_for(attempt);
                    warn!(
                        what,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Request failed, retrying"
                    );
                    std::thread::sleep(backoff);
                }
                Err(err) => {
                    if err.is_transient() {
                        error!(what, attempts = attempt, error = %err, "Request failed after retries");
                    }
                    return Err(err);
                }
            }
        }
    }
}
