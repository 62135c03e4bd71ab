//! # Backoff
//!
//! Delay calculators used by the controller.
//!
//! - [`CooldownBackoff`]: the per-target cooldown applied after consecutive
//!   pre-execution failures. It is stateless: the failure count lives in the
//!   record status, so the delay survives controller restarts and is shared by
//!   every replica.
//! - [`ExponentialBackoff`]: a short-lived, stateful retry delay for transient
//!   submission errors, kept in memory per record.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use workflow_execution_controller::controller::backoff::CooldownBackoff;
//!
//! let cooldown = CooldownBackoff::new(Duration::from_secs(60), Duration::from_secs(600), 4);
//! assert_eq!(cooldown.delay_for(1), Duration::from_secs(60));   // 1m
//! assert_eq!(cooldown.delay_for(2), Duration::from_secs(120));  // 2m
//! assert_eq!(cooldown.delay_for(3), Duration::from_secs(240));  // 4m
//! assert_eq!(cooldown.delay_for(4), Duration::from_secs(480));  // 8m
//! assert_eq!(cooldown.delay_for(5), Duration::from_secs(600));  // 16m capped at 10m
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Exponential cooldown for consecutive pre-execution failures
///
/// `delay = min(base * 2^min(failures - 1, max_exponent), max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownBackoff {
    base: Duration,
    max: Duration,
    max_exponent: u32,
}

impl CooldownBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_exponent: u32) -> Self {
        Self {
            base,
            max,
            max_exponent,
        }
    }

    /// Cooldown after `consecutive_failures` pre-execution failures in a row
    ///
    /// A count of zero is treated as one. The result never exceeds the
    /// configured maximum, including when the multiplication would overflow.
    #[must_use]
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures
            .saturating_sub(1)
            .min(self.max_exponent);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Earliest time a new attempt may start after `consecutive_failures`
    #[must_use]
    pub fn next_allowed_execution(
        &self,
        now: DateTime<Utc>,
        consecutive_failures: u32,
    ) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for(consecutive_failures))
            .unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Doubling retry delay with a ceiling
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use workflow_execution_controller::controller::backoff::ExponentialBackoff;
///
/// let mut backoff = ExponentialBackoff::new(5_000, 60_000);
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_ms: u64,
    max_ms: u64,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(start_ms: u64, max_ms: u64) -> Self {
        Self {
            current_ms: start_ms,
            max_ms,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_ms.min(self.max_ms);
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        Duration::from_millis(result)
    }
}
