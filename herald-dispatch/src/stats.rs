//! Run statistics
//!
//! The [`StatsAggregator`] observes every attempt of a run. Per-target
//! counters and run totals sit behind one lock and are updated together, so
//! a snapshot never sees a total that disagrees with its breakdown.

use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};

use chrono::{DateTime, Utc};
use herald_common::{AttemptRecord, JobId, JobStatus, Outcome, Target};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Attempt counters for one target, or for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TargetStats {
    /// Attempts observed
    pub total: u64,
    /// Attempts the service accepted
    pub sent: u64,
    /// Attempts that failed transiently or were rejected
    pub failed: u64,
    /// Attempts the service throttled
    pub rate_limited: u64,
    /// Sum of attempt latencies, in milliseconds
    pub latency_ms: u64,
}

impl TargetStats {
    fn observe(&mut self, outcome: &Outcome, latency: Duration) {
        self.total += 1;
        match outcome {
            Outcome::Success { .. } => self.sent += 1,
            Outcome::TransientFailure(_) | Outcome::ValidationFailure(_) => self.failed += 1,
            Outcome::RateLimited { .. } => self.rate_limited += 1,
        }
        self.latency_ms = self
            .latency_ms
            .saturating_add(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
    }

    /// Mean latency per attempt, in milliseconds.
    #[must_use]
    pub fn average_latency_ms(&self) -> u64 {
        self.latency_ms.checked_div(self.total).unwrap_or_default()
    }
}

/// Immutable snapshot of a run's statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatsView {
    pub totals: TargetStats,
    /// Percentage of sent over sent + failed; 0 before any such attempt
    pub success_rate: f64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_exhausted: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub messages_per_sec: f64,
    pub targets: BTreeMap<Target, TargetStats>,
}

impl RunStatsView {
    #[must_use]
    pub const fn total_sent(&self) -> u64 {
        self.totals.sent
    }

    #[must_use]
    pub const fn total_failed(&self) -> u64 {
        self.totals.failed
    }

    #[must_use]
    pub const fn total_rate_limited(&self) -> u64 {
        self.totals.rate_limited
    }
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

#[derive(Debug)]
struct Clock {
    started: Instant,
    started_at: DateTime<Utc>,
    last_observed: Instant,
    finished: Option<(Instant, DateTime<Utc>)>,
}

impl Clock {
    fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            started_at: Utc::now(),
            last_observed: now,
            finished: None,
        }
    }

    fn elapsed(&self) -> Duration {
        let end = self.finished.map_or(self.last_observed, |(at, _)| at);
        end.saturating_duration_since(self.started).max(MIN_ELAPSED)
    }
}

#[derive(Debug)]
struct Aggregate {
    totals: TargetStats,
    targets: BTreeMap<Target, TargetStats>,
    seen: HashSet<(JobId, u32)>,
    jobs_succeeded: u64,
    jobs_failed: u64,
    jobs_exhausted: u64,
    clock: Clock,
}

impl Aggregate {
    fn new() -> Self {
        Self {
            totals: TargetStats::default(),
            targets: BTreeMap::new(),
            seen: HashSet::new(),
            jobs_succeeded: 0,
            jobs_failed: 0,
            jobs_exhausted: 0,
            clock: Clock::start(),
        }
    }

    fn observe(&mut self, target: &Target, outcome: &Outcome, latency: Duration) {
        if self.clock.finished.is_some() {
            return;
        }

        self.totals.observe(outcome, latency);
        self.targets
            .entry(target.clone())
            .or_default()
            .observe(outcome, latency);
        self.clock.last_observed = Instant::now();
    }
}

/// Thread-safe collector of per-target and run-wide statistics
#[derive(Debug)]
pub struct StatsAggregator {
    inner: Mutex<Aggregate>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Aggregate::new()),
        }
    }

    /// Restart the run clock; counters are kept.
    pub fn start(&self) {
        self.inner.lock().clock = Clock::start();
    }

    /// Record one attempt's outcome for `target`.
    pub fn record_outcome(&self, target: &Target, outcome: &Outcome, latency: Duration) {
        self.inner.lock().observe(target, outcome, latency);
    }

    /// Record an attempt from a job's history.
    ///
    /// Returns `false` and changes nothing if this attempt was already
    /// recorded or the run has been finalized.
    pub fn record_attempt(&self, record: &AttemptRecord) -> bool {
        let mut inner = self.inner.lock();
        if inner.clock.finished.is_some() || !inner.seen.insert((record.job_id, record.sequence)) {
            return false;
        }

        inner.observe(&record.target, &record.outcome, record.latency);
        true
    }

    /// Count a job that reached a terminal status.
    pub fn record_job_finished(&self, status: JobStatus) {
        let mut inner = self.inner.lock();
        match status {
            JobStatus::Succeeded => inner.jobs_succeeded += 1,
            JobStatus::Failed => inner.jobs_failed += 1,
            JobStatus::Exhausted => inner.jobs_exhausted += 1,
            JobStatus::Pending | JobStatus::InFlight | JobStatus::RateLimited => {}
        }
    }

    /// Fix the end of the run; later records are ignored.
    pub fn finalize(&self) {
        let mut inner = self.inner.lock();
        if inner.clock.finished.is_none() {
            inner.clock.finished = Some((Instant::now(), Utc::now()));
        }
    }

    /// Take a consistent snapshot of everything observed so far.
    #[must_use]
    pub fn snapshot(&self) -> RunStatsView {
        let inner = self.inner.lock();
        let totals = inner.totals;
        let elapsed = inner.clock.elapsed();

        let decided = totals.sent + totals.failed;
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if decided == 0 {
            0.0
        } else {
            totals.sent as f64 * 100.0 / decided as f64
        };
        #[allow(clippy::cast_precision_loss)]
        let messages_per_sec = totals.sent as f64 / elapsed.as_secs_f64();

        RunStatsView {
            totals,
            success_rate,
            jobs_succeeded: inner.jobs_succeeded,
            jobs_failed: inner.jobs_failed,
            jobs_exhausted: inner.jobs_exhausted,
            started_at: inner.clock.started_at,
            finished_at: inner.clock.finished.map(|(_, at)| at),
            elapsed,
            messages_per_sec,
            targets: inner.targets.clone(),
        }
    }
}
