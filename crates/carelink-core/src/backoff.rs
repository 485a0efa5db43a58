use std::time::Duration;

use crate::config::ReconnectConfig;

/// Exponential backoff with jitter.
///
/// `delay = min(initial * multiplier^attempt, max) * (1 + jitter * sin(attempt * 7.3))`
///
/// The jitter is deterministic per attempt number. It is not random, but
/// it still spreads reconnection storms from clients that failed at
/// different times.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let max = config.max_delay.as_secs_f64();
    let base = config.initial_delay.as_secs_f64() * config.multiplier.powf(f64::from(attempt));
    let capped = if base.is_finite() { base.min(max) } else { max };

    let jitter_factor = 1.0 + config.jitter * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    if with_jitter.is_finite() {
        Duration::from_secs_f64(with_jitter)
    } else {
        config.max_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert_eq!(d0, Duration::from_secs(3));
        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(10),
            ..ReconnectConfig::default()
        };

        // With jitter factor up to 1.25, max effective is 12.5s
        for attempt in [10, 40, 1000, u32::MAX] {
            let delay = calculate_backoff(attempt, &config);
            assert!(
                delay <= Duration::from_millis(12_500),
                "delay at attempt {attempt} ({delay:?}) should be capped near max_delay"
            );
        }
    }

    #[test]
    fn flat_config_never_varies() {
        let config = ReconnectConfig::flat(Duration::from_secs(3));
        for attempt in 0..20 {
            assert_eq!(calculate_backoff(attempt, &config), Duration::from_secs(3));
        }
    }
}
