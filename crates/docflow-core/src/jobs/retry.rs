//! Job retry logic with exponential backoff

use std::time::Duration;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial delay
    pub initial_delay: Duration,

    /// Maximum delay
    pub max_delay: Duration,

    /// Multiplier (usually 2.0)
    pub multiplier: f64,

    /// Jitter factor (0.0 - 1.0) to randomize delays
    pub jitter: f64,
}

impl ExponentialBackoff {
    /// Create new exponential backoff
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter: 0.1, // 10% jitter by default
        }
    }

    /// With jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay for attempt
    pub fn calculate_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(self.initial_delay);
        }

        // Calculate exponential delay
        let exponent = attempt.saturating_sub(1) as f64;
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powf(exponent);

        // Cap at max delay
        let delay_secs = delay_secs.min(self.max_delay.as_secs_f64());

        // Apply jitter
        let jitter_range = delay_secs * self.jitter;
        let jitter = if self.jitter > 0.0 {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            rng.gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        let final_delay = (delay_secs + jitter).max(0.0);

        Some(Duration::from_secs_f64(final_delay))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600), // 1 hour
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        // Use no jitter for predictable test results
        let backoff = ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
            jitter: 0.0, // No jitter for predictable tests
        };

        // attempt 0 uses initial_delay directly
        let delay0 = backoff.calculate_delay(0).unwrap();
        assert_eq!(delay0, Duration::from_secs(1));

        // attempt 1: 1s * 2^0 = 1s (exponent = attempt-1 = 0)
        let delay1 = backoff.calculate_delay(1).unwrap();
        assert_eq!(delay1, Duration::from_secs(1));

        // attempt 2: 1s * 2^1 = 2s (exponent = attempt-1 = 1)
        let delay2 = backoff.calculate_delay(2).unwrap();
        assert_eq!(delay2, Duration::from_secs(2));

        // attempt 3: 1s * 2^2 = 4s
        let delay3 = backoff.calculate_delay(3).unwrap();
        assert_eq!(delay3, Duration::from_secs(4));
    }
}
