//! Configuration surface consumed by the dispatch engine.
//!
//! Every value is read once when a run starts and treated as immutable for
//! the rest of that run.

use serde::{Deserialize, Serialize};

use crate::{
    error::SystemError,
    policy::{Backoff, RetryPolicy},
    rate_limiter::{MAX_COOLDOWN, RateLimitConfig},
};

const fn default_max_concurrent() -> usize {
    5
}

/// Top-level configuration for a [`DispatchScheduler`](crate::DispatchScheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Request quotas and cooldown behaviour
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry budget and backoff growth
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Default number of concurrent workers
    ///
    /// Default: 5
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl DispatchConfig {
    /// Check that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SystemError> {
        let invalid = |field: &str, reason: &str| {
            Err(SystemError::Configuration(format!("{field}: {reason}")))
        };

        if self.rate_limit.max_requests_per_minute == 0 {
            return invalid("rate_limit.max_requests_per_minute", "must be at least 1");
        }
        if self.rate_limit.max_requests_per_hour == 0 {
            return invalid("rate_limit.max_requests_per_hour", "must be at least 1");
        }
        if self.rate_limit.cooldown_secs > MAX_COOLDOWN.as_secs() {
            return invalid("rate_limit.cooldown_secs", "must be at most 604800 (7 days)");
        }
        if self.max_concurrent == 0 {
            return invalid("max_concurrent", "must be at least 1");
        }

        let retry = &self.retry;
        if !retry.backoff_factor.is_finite() {
            return invalid("retry.backoff_factor", "must be a finite number");
        }
        match retry.backoff {
            Backoff::Exponential if retry.backoff_factor < 1.0 => {
                return invalid("retry.backoff_factor", "must be >= 1.0 for exponential backoff");
            }
            Backoff::Linear if retry.backoff_factor < 0.0 => {
                return invalid("retry.backoff_factor", "must be >= 0.0 for linear backoff");
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return invalid("retry.jitter_factor", "must be between 0.0 and 1.0");
        }
        if retry.max_retry_delay_ms < retry.base_retry_delay_ms {
            return invalid(
                "retry.max_retry_delay_ms",
                "must not be smaller than retry.base_retry_delay_ms",
            );
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = DispatchConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        let error = config.validate().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Configuration error: max_concurrent: must be at least 1"
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = DispatchConfig::default();
        config.rate_limit.max_requests_per_hour = 0;
        assert!(config.validate().is_err());

        let mut config = DispatchConfig::default();
        config.rate_limit.max_requests_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cooldown_upper_bound() {
        let mut config = DispatchConfig::default();
        config.rate_limit.cooldown_secs = MAX_COOLDOWN.as_secs();
        assert!(config.validate().is_ok());

        config.rate_limit.cooldown_secs = u64::MAX;
        let error = config.validate().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Configuration error: rate_limit.cooldown_secs: must be at most 604800 (7 days)"
        );
    }

    #[test]
    fn test_backoff_factor_bounds() {
        let mut config = DispatchConfig::default();
        config.retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());

        config.retry.backoff = Backoff::Linear;
        assert!(config.validate().is_ok());

        config.retry.backoff_factor = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jitter_bounds() {
        let mut config = DispatchConfig::default();
        config.retry.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }
}
