//! Retry policy for Schwab requests.

use std::time::Duration;

use rand::Rng;

/// How failed requests are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied after every retry.
    pub factor: f64,
    /// Random spread as a fraction of the delay (0.1 = ±10%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// A single attempt.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// Fresh delay schedule for one request.
    pub(super) const fn backoff(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            made: 1,
            delay: self.base_delay,
        }
    }
}

/// Delay schedule of one request. Yields the pause before each retry and
/// ends once the attempt budget is spent.
#[derive(Debug)]
pub(super) struct Backoff<'a> {
    config: &'a RetryConfig,
    made: u32,
    delay: Duration,
}

impl Backoff<'_> {
    /// Attempts made so far, the one in flight included.
    pub(super) const fn attempts(&self) -> u32 {
        self.made
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let spread = delay.as_secs_f64() * self.config.jitter;
        if spread <= 0.0 {
            return delay;
        }
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.made >= self.config.attempts {
            return None;
        }
        self.made += 1;

        let current = self.delay;
        let grown = current.as_secs_f64() * self.config.factor;
        self.delay = Duration::from_secs_f64(grown.min(self.config.max_delay.as_secs_f64()));
        Some(self.jittered(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            factor: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn delays_grow_until_capped() {
        let config = no_jitter(5);
        let delays: Vec<_> = config.backoff().collect();
        assert_eq!(
            delays,
            [100, 200, 250, 250].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn attempts_count_the_first_request() {
        let config = no_jitter(3);
        let mut backoff = config.backoff();
        assert_eq!(backoff.attempts(), 1);
        backoff.next();
        backoff.next();
        assert_eq!(backoff.attempts(), 3);
        assert_eq!(backoff.next(), None);
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn jitter_stays_within_spread() {
        let config = RetryConfig {
            attempts: 50,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            factor: 1.0,
            jitter: 0.1,
        };
        for delay in config.backoff() {
            assert!(delay >= Duration::from_millis(899), "{delay:?}");
            assert!(delay <= Duration::from_millis(1101), "{delay:?}");
        }
    }

    #[test]
    fn disabled_has_no_retries() {
        assert_eq!(RetryConfig::disabled().backoff().count(), 0);
    }
}
