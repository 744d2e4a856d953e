use std::time::Duration;

/// Re-exported so downstream users configuring custom policies don't need
/// their own dependency on the backoff crate.
pub use exponential_backoff::Backoff;

/// The backing store's read-only `Get` retry policy: up to `max_attempts`
/// tries, each attempt budgeted with a per-attempt timeout that grows by
/// `factor` starting from `initial_timeout`, with a fixed `pause` between
/// attempts. Writes never use this policy — they are not retried.
///
/// The growing per-attempt timeout is computed via the same backoff-curve
/// crate the reference read-retry logic uses, repurposed here to size
/// timeouts rather than delays.
#[derive(Debug, Clone)]
pub struct GetRetryPolicy {
    max_attempts: u32,
    pause: Duration,
    curve: Backoff,
}

impl GetRetryPolicy {
    pub fn new(max_attempts: u32, initial_timeout: Duration, factor: u32, pause: Duration) -> Self {
        let mut curve = Backoff::new(max_attempts.max(1), initial_timeout, None);
        curve.set_factor(factor);
        curve.set_jitter(0.0);
        Self {
            max_attempts: max_attempts.max(1),
            pause,
            curve,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Timeout budget for the given 1-indexed attempt number.
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        self.curve
            .next(attempt)
            .unwrap_or_else(|| self.curve.next(self.max_attempts).unwrap_or(Duration::from_secs(2)))
    }
}

impl Default for GetRetryPolicy {
    /// The spec's own defaults: 3 attempts, 2s initial timeout, factor 2,
    /// 500ms inter-attempt pause.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), 2, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_grow_by_the_configured_factor() {
        let policy = GetRetryPolicy::default();
        let first = policy.attempt_timeout(1);
        let second = policy.attempt_timeout(2);
        assert!(second >= first);
    }

    #[test]
    fn default_matches_the_spec() {
        let policy = GetRetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.pause(), Duration::from_millis(500));
    }
}
