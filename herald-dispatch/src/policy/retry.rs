//! Retry policy for send attempts.
//!
//! Maps the classified [`Outcome`] of an attempt onto either a terminal
//! status or a delay before the job is offered to the workers again.

use std::time::Duration;

use herald_common::{JobStatus, Outcome};
use serde::{Deserialize, Serialize};

use crate::{queue::retry::calculate_retry_delay, rate_limiter::MAX_COOLDOWN};

/// Growth function applied to the base delay across successive retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backoff {
    /// `base * factor^(n - 1)`
    #[default]
    Exponential,
    /// `base * (1 + factor * (n - 1))`
    Linear,
}

/// What to do with a job after one of its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The current send is over with this status.
    ///
    /// `Succeeded` finishes only the current send: a job with sends left is
    /// paced and offered again by the scheduler.
    Finalize(JobStatus),
    /// Offer the job again once the delay has passed.
    RetryAfter(Duration),
}

/// Retry policy configuration for send attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed per send after the first attempt fails transiently.
    ///
    /// A send is tried at most `max_retries + 1` times.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (in milliseconds).
    ///
    /// Default: 5000
    #[serde(default = "defaults::base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    /// Upper bound on any computed retry delay (in milliseconds).
    ///
    /// Default: 3600000 (1 hour)
    #[serde(default = "defaults::max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// How the delay grows with each retry.
    #[serde(default)]
    pub backoff: Backoff,

    /// Growth factor fed to [`Backoff`].
    ///
    /// Default: 2.0
    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    /// Delays are randomized within ±`jitter_factor`.
    ///
    /// Default: 0.0 (no jitter)
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_retry_delay_ms: defaults::base_retry_delay_ms(),
            max_retry_delay_ms: defaults::max_retry_delay_ms(),
            backoff: Backoff::default(),
            backoff_factor: defaults::backoff_factor(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Decide what follows an attempt.
    ///
    /// `attempt` is the 1-based, budget-charged attempt number of the current
    /// send. `cooldown` is the rate limiter's cooldown period; a rate-limited
    /// attempt waits at least that long, or longer if the service said so.
    /// Rate-limited attempts never exhaust the budget.
    #[must_use]
    pub fn on_outcome(&self, outcome: &Outcome, attempt: u32, cooldown: Duration) -> Decision {
        match outcome {
            Outcome::Success { .. } => Decision::Finalize(JobStatus::Succeeded),
            Outcome::ValidationFailure(_) => Decision::Finalize(JobStatus::Failed),
            Outcome::RateLimited { retry_after } => {
                let hint = retry_after.map(|hint| hint.min(MAX_COOLDOWN));
                Decision::RetryAfter(hint.map_or(cooldown, |hint| hint.max(cooldown)))
            }
            Outcome::TransientFailure(_) if self.should_retry(attempt) => {
                Decision::RetryAfter(self.retry_delay(attempt))
            }
            Outcome::TransientFailure(_) => Decision::Finalize(JobStatus::Exhausted),
        }
    }

    /// Check if a transient failure on this attempt still leaves budget.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Get the number of retries left after this attempt.
    #[must_use]
    pub const fn remaining_retries(&self, attempt: u32) -> u32 {
        self.max_retries.saturating_sub(attempt)
    }

    /// Delay before retrying after the given failed attempt.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        calculate_retry_delay(
            attempt,
            self.base_delay(),
            self.max_delay(),
            self.backoff,
            self.backoff_factor,
            self.jitter_factor,
        )
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn base_retry_delay_ms() -> u64 {
        5000
    }

    pub const fn max_retry_delay_ms() -> u64 {
        3_600_000 // 1 hour
    }

    pub const fn backoff_factor() -> f64 {
        2.0
    }

    pub const fn jitter_factor() -> f64 {
        0.0
    }
}
