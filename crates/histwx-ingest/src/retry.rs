use std::time::Duration;

/// Bounded retry with exponential backoff
///
/// A policy with `max_retries = n` makes at most `n + 1` attempts. The wait
/// before retry `k` (1-based) is `base_delay * 2^(k-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Budget for the first pass over all locations
    pub fn primary() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Larger budget and longer base delay for the retry sweep
    pub fn sweep() -> Self {
        Self::new(5, Duration::from_secs(5))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the given retry (1-based); zero for retry 0
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::primary()
    }
}
