//! Retry delay calculation with backoff and jitter

use std::time::Duration;

use rand::Rng;

use crate::policy::Backoff;

/// Calculate the delay before retrying a failed attempt
///
/// # Formula
/// - exponential: `delay = min(base * factor^(attempt - 1), max) * (1 ± jitter)`
/// - linear: `delay = min(base * (1 + factor * (attempt - 1)), max) * (1 ± jitter)`
///
/// `attempt` is 1-indexed. A growth that overflows or is not finite is
/// treated as reaching `max`.
#[must_use]
pub fn calculate_retry_delay(
    attempt: u32,
    base: Duration,
    max: Duration,
    backoff: Backoff,
    factor: f64,
    jitter_factor: f64,
) -> Duration {
    let steps = attempt.saturating_sub(1);
    let base_ms = base.as_secs_f64() * 1000.0;
    let max_ms = max.as_secs_f64() * 1000.0;

    let grown = match backoff {
        Backoff::Exponential => base_ms * factor.powi(i32::try_from(steps).unwrap_or(i32::MAX)),
        Backoff::Linear => base_ms * factor.mul_add(f64::from(steps), 1.0),
    };
    let delay_ms = if grown.is_finite() {
        grown.clamp(0.0, max_ms)
    } else {
        max_ms
    };

    let jitter_range = delay_ms * jitter_factor;
    let jittered_ms = if jitter_range > 0.0 {
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        (delay_ms + jitter).max(0.0)
    } else {
        delay_ms
    };

    // Intentional truncation to whole milliseconds
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Duration::from_millis(jittered_ms.round() as u64)
}
