//! # Exponential Backoff
//!
//! Doubling backoff used for two things: spacing out retries of a single
//! store operation within a pass, and spacing out requeues of a cluster that
//! keeps failing.
//!
//! Sequence for `new(200ms, 5s)`: 200ms, 400ms, 800ms, 1.6s, 3.2s, 5s (max).

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each backoff is twice the previous one, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Next backoff value to hand out
    current: Duration,
    /// Maximum backoff value
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with the given initial and maximum values
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Calculate the backoff for a given number of consecutive errors (stateless)
    ///
    /// `error_count` 0 and 1 both yield `initial`, after that the value
    /// doubles per error: initial, initial, initial*2, initial*4, ...
    #[must_use]
    pub fn calculate_for_error_count(error_count: u32, initial: Duration, max: Duration) -> Duration {
        let exponent = error_count.saturating_sub(1);
        initial
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(max)
    }
}
