//! Exponential backoff for reconnection

use std::time::Duration;

use mp_core::config::BackoffConfig;

/// Exponential backoff state for reconnection attempts.
///
/// Tracks the number of failed attempts since the last successful session.
/// No jitter is applied, so delays are exactly reproducible.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first retry
    initial: Duration,
    /// Maximum delay
    max: Duration,
    /// Failed attempts since the last reset
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max)
    }

    /// Create a new backoff with custom parameters
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay to wait before attempt number `attempt`.
    ///
    /// Attempt 0 is immediate; attempt `n >= 1` waits
    /// `min(initial * 2^(n-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt - 1;
        if exponent >= u32::BITS {
            return self.max;
        }

        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay before the next attempt
    pub fn next_delay(&self) -> Duration {
        self.delay_for(self.attempt)
    }

    /// Failed attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failed attempt and return the new attempt count
    pub fn record_failure(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    /// Reset to an immediate next attempt
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
