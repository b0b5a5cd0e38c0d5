use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct RestartBackoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl RestartBackoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: true,
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before the restart that follows `prior` recent restarts. Zero when there were none.
    pub fn delay_for(&self, prior: usize) -> Duration {
        if prior == 0 {
            return Duration::ZERO;
        }

        let exponent = (prior - 1).min(16) as i32;
        let raw = self.base.as_secs_f64() * 2f64.powi(exponent);
        let capped = raw.min(self.max.as_secs_f64());

        let factor = if self.jitter {
            0.5 + rand::random::<f64>() * 0.5
        } else {
            1.0
        };

        Duration::from_secs_f64(capped * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delay_without_prior_restarts() {
        let backoff = RestartBackoff::exponential(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn test_exponential_growth_capped() {
        let backoff = RestartBackoff::exponential(Duration::from_secs(1), Duration::from_secs(60))
            .with_jitter(false);
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(1000), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full() {
        let backoff = RestartBackoff::exponential(Duration::from_secs(4), Duration::from_secs(60));
        for _ in 0..50 {
            let delay = backoff.delay_for(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(4));
        }
    }
}
