//! Exponential retry backoff.

use std::time::Duration;

use crate::config::ProcessorConfig;

/// `min(base * 2^retried, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Delay before the attempt following `retried` failed attempts
    pub fn delay_for(&self, retried: u32) -> Duration {
        2u32.checked_pow(retried)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ProcessorConfig::default())
    }
}
