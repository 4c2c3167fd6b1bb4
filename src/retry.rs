//! Bounded retry with fixed or exponential backoff.
//!
//! Only errors the classifier marks as transient are retried. Anything else is
//! returned untouched after the first call; running out of attempts wraps the
//! last error in `FetchError::RetryExhausted`.

use crate::config::{BackoffKind, RetryConfig};
use crate::model::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Every retry waits `base_delay`.
    Fixed,
    /// Retry `n` waits `base_delay * 2^(n-1)`, capped at `max_delay`.
    Exponential,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
    pub jitter: bool,
    pub is_transient: fn(&FetchError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(60),
            backoff,
            jitter: false,
            is_transient: FetchError::is_transient,
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        let backoff = match cfg.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential,
        };
        Self {
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter: cfg.jitter,
            ..Self::new(cfg.max_attempts, Duration::from_millis(cfg.base_delay_ms), backoff)
        }
    }

    /// Delay before retry number `retry` (1-based), before jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor: f64 = rand::rng().random_range(0.5..=1.0);
        delay.mul_f64(factor)
    }

    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !(self.is_transient)(&err) {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                return Err(FetchError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.jittered(self.delay_for(attempt));
            warn!(
                "Attempt {}/{} failed: {} (retrying in {:?})",
                attempt, self.max_attempts, err, delay
            );
            sleep(delay).await;
        }
    }
}
