//! Retry backoff policy
//!
//! One policy instance serves every fetch path (page fetch, resolution
//! probe, image download). Delays grow exponentially from a configured base
//! up to a cap, with uniform jitter proportional to the computed delay so
//! that concurrent tasks failing together do not retry together.

use crate::config::HarvesterConfig;
use crate::fetch::client::FetchErrorKind;
use rand::Rng;
use std::time::Duration;

/// Decides whether and when a failed operation is retried
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    base: Duration,

    /// Ceiling on the exponential component of the delay
    cap: Duration,

    /// Retry ceiling; an attempt count at or past this is never retried
    max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, max_retries: u32) -> Self {
        Self {
            base,
            cap,
            max_retries,
        }
    }

    pub fn from_config(config: &HarvesterConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base),
            Duration::from_millis(config.backoff_cap),
            config.max_retries,
        )
    }

    /// Computes the delay before retry number `attempt + 1`
    ///
    /// The exponential component is `base * 2^attempt`, capped; jitter adds
    /// up to half of that again.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap);

        let jitter_ceiling = exponential.as_millis() as u64 / 2;
        let jitter = if jitter_ceiling > 0 {
            rand::thread_rng().gen_range(0..jitter_ceiling)
        } else {
            0
        };

        exponential + Duration::from_millis(jitter)
    }

    /// Returns true when the failure is worth another attempt
    ///
    /// Non-transient kinds are never retried regardless of attempt count.
    pub fn should_retry(&self, kind: FetchErrorKind, attempt: u32) -> bool {
        kind.is_transient() && attempt < self.max_retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
