//! Global send quotas with a cooldown override
//!
//! Every send must first be approved here. Two sliding windows track the
//! sends approved in the last minute and the last hour; an approval is only
//! granted while both windows have room and no cooldown is active.
//!
//! # Cooldown
//!
//! When the remote service reports that it is throttling us, the limiter
//! enters a cooldown that denies every request until it expires, whatever the
//! window counts say. The service's signal is authoritative.
//!
//! ```text
//! minute capacity: 3
//! t=0s   approve  approve  approve        (window full)
//! t=1s   deny, retry after 59s            (oldest stamp leaves at t=60s)
//! t=5s   rate-limit signal, cooldown 60s
//! t=60s  deny, retry after 5s             (cooldown until t=65s)
//! t=65s  approve
//! ```

use std::{collections::VecDeque, time::Duration};

use herald_common::tracing;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Longest cooldown the limiter will hold, whatever the configuration or the
/// remote service asks for.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 3600);

/// How a rate-limit signal interacts with a cooldown that is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CooldownMode {
    /// Restart the cooldown from the moment of the new signal
    #[default]
    Reset,
    /// Add a full period to the release time of the running cooldown
    Extend,
}

/// Configuration for the global rate limiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sends allowed in any 60 second window
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,

    /// Sends allowed in any 3600 second window
    #[serde(default = "default_max_requests_per_hour")]
    pub max_requests_per_hour: u32,

    /// Length of the cooldown entered on a rate-limit signal (in seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Behaviour on repeated rate-limit signals
    #[serde(default)]
    pub cooldown_mode: CooldownMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_max_requests_per_minute(),
            max_requests_per_hour: default_max_requests_per_hour(),
            cooldown_secs: default_cooldown_secs(),
            cooldown_mode: CooldownMode::default(),
        }
    }
}

impl RateLimitConfig {
    /// Configured cooldown period, capped at [`MAX_COOLDOWN`]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs).min(MAX_COOLDOWN)
    }
}

const fn default_max_requests_per_minute() -> u32 {
    30
}

const fn default_max_requests_per_hour() -> u32 {
    500
}

const fn default_cooldown_secs() -> u64 {
    60
}

/// Answer to a request for permission to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The send may proceed; it has been counted in every window.
    Approved,
    /// The send must wait at least `retry_after` before asking again.
    Denied { retry_after: Duration },
}

impl Acquire {
    #[must_use]
    pub const fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Sliding record of approval timestamps over a fixed span.
#[derive(Debug)]
struct RateWindow {
    span: Duration,
    capacity: usize,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    fn new(span: Duration, capacity: u32) -> Self {
        let capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
        Self {
            span,
            capacity,
            stamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while self
            .stamps
            .front()
            .is_some_and(|stamp| now.saturating_duration_since(*stamp) >= self.span)
        {
            self.stamps.pop_front();
        }
    }

    /// Time until one more approval fits; zero when there is room now.
    fn wait_for_slot(&self, now: Instant) -> Duration {
        if self.stamps.len() < self.capacity {
            return Duration::ZERO;
        }

        let blocking = self.stamps.len() - self.capacity;
        self.stamps
            .get(blocking)
            .map_or(Duration::ZERO, |oldest| {
                (*oldest + self.span).saturating_duration_since(now)
            })
    }

    fn record(&mut self, now: Instant) {
        self.stamps.push_back(now);
    }
}

#[derive(Debug)]
struct LimiterState {
    minute: RateWindow,
    hour: RateWindow,
    cooldown_until: Option<Instant>,
}

impl LimiterState {
    fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.cooldown_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }
}

/// Global rate limiter shared by every worker of a run.
///
/// All state lives behind one mutex, so [`try_acquire`](Self::try_acquire) and
/// [`record_rate_limit_signal`](Self::record_rate_limit_signal) are atomic with
/// respect to each other.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let state = LimiterState {
            minute: RateWindow::new(MINUTE, config.max_requests_per_minute),
            hour: RateWindow::new(HOUR, config.max_requests_per_hour),
            cooldown_until: None,
        };

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Ask for permission to send one message now.
    ///
    /// On approval the send is recorded in both windows. On denial the
    /// returned wait is the furthest of the cooldown release and the time
    /// until each full window frees a slot.
    pub fn try_acquire(&self) -> Acquire {
        self.try_acquire_at(Instant::now())
    }

    pub(crate) fn try_acquire_at(&self, now: Instant) -> Acquire {
        let mut state = self.state.lock();
        state.minute.prune(now);
        state.hour.prune(now);

        let retry_after = state
            .cooldown_remaining(now)
            .max(state.minute.wait_for_slot(now))
            .max(state.hour.wait_for_slot(now));

        if retry_after.is_zero() {
            state.cooldown_until = None;
            state.minute.record(now);
            state.hour.record(now);
            Acquire::Approved
        } else {
            drop(state);
            tracing::debug!(
                wait_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "Rate limit exceeded, must wait"
            );
            Acquire::Denied { retry_after }
        }
    }

    /// Enter a cooldown after the remote service reported throttling.
    ///
    /// The cooldown lasts the configured period, or `retry_after` if the
    /// service asked for longer, and never more than [`MAX_COOLDOWN`].
    /// Returns the instant the cooldown releases.
    pub fn record_rate_limit_signal(&self, retry_after: Option<Duration>) -> Instant {
        self.record_rate_limit_signal_at(Instant::now(), retry_after)
    }

    pub(crate) fn record_rate_limit_signal_at(
        &self,
        now: Instant,
        retry_after: Option<Duration>,
    ) -> Instant {
        let cooldown = self.config.cooldown();
        let period = retry_after.map_or(cooldown, |hint| hint.min(MAX_COOLDOWN).max(cooldown));

        let mut state = self.state.lock();
        let left = state.cooldown_remaining(now);
        let wait = match self.config.cooldown_mode {
            _ if left.is_zero() => period,
            CooldownMode::Extend => left.saturating_add(period),
            CooldownMode::Reset => left.max(period),
        }
        .min(MAX_COOLDOWN);

        let release = now
            .checked_add(wait)
            .or(state.cooldown_until)
            .unwrap_or(now);
        state.cooldown_until = Some(release);
        drop(state);

        tracing::warn!(
            cooldown_ms = u64::try_from(release.saturating_duration_since(now).as_millis())
                .unwrap_or(u64::MAX),
            mode = ?self.config.cooldown_mode,
            "Remote service is throttling, entering cooldown"
        );

        release
    }

    /// Current window usage, for reporting.
    #[must_use]
    pub fn stats(&self) -> RateLimitStats {
        self.stats_at(Instant::now())
    }

    fn stats_at(&self, now: Instant) -> RateLimitStats {
        let mut state = self.state.lock();
        state.minute.prune(now);
        state.hour.prune(now);

        RateLimitStats {
            minute_used: state.minute.stamps.len(),
            minute_capacity: self.config.max_requests_per_minute,
            hour_used: state.hour.stamps.len(),
            hour_capacity: self.config.max_requests_per_hour,
            cooldown_remaining: state.cooldown_remaining(now),
        }
    }
}

/// Point-in-time usage of the limiter's windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub minute_used: usize,
    pub minute_capacity: u32,
    pub hour_used: usize,
    pub hour_capacity: u32,
    pub cooldown_remaining: Duration,
}
