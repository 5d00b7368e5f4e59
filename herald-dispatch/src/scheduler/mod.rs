//! Run orchestration
//!
//! A [`DispatchScheduler`] drives one run: it seeds a [`DispatchQueue`] with
//! the submitted jobs, spawns a bounded pool of workers over it and waits for
//! the queue to drain or the run to be cancelled.
//!
//! ```text
//! Idle -> Running -> Draining -> Completed
//!            \           \
//!             +-----------+--> Cancelled
//! ```
//!
//! The run enters `Draining` once every submitted job has been handed to a
//! worker at least once; what is left are retries and paced follow-up sends.

mod worker;

use std::sync::Arc;

use herald_common::{Job, JobId, JobSpec, internal, tracing};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    config::DispatchConfig,
    error::{DispatchError, SystemError},
    policy::RetryPolicy,
    queue::DispatchQueue,
    rate_limiter::RateLimiter,
    stats::{RunStatsView, StatsAggregator},
    transport::Transport,
};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    Draining,
    Completed,
    Cancelled,
}

impl RunState {
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Everything a finished run has to say.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub stats: RunStatsView,
    /// Every submitted job in submission order, terminal or not, with its
    /// attempt history
    pub jobs: Vec<Job>,
}

impl RunReport {
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }
}

/// State shared by the workers of one run.
pub(crate) struct RunContext {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    stats: Arc<StatsAggregator>,
    policy: RetryPolicy,
    queue: Arc<DispatchQueue>,
    finished: Mutex<Vec<Job>>,
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
}

impl RunContext {
    /// Enter `Draining` once no fresh job is left.
    fn note_dequeue(&self) {
        if self.queue.fresh() > 0 {
            return;
        }

        let mut state = self.state.lock();
        if *state == RunState::Running {
            *state = RunState::Draining;
            drop(state);
            internal!(level = DEBUG, "Every job dispatched at least once, draining");
        }
    }
}

/// Single-use orchestrator for one dispatch run
pub struct DispatchScheduler {
    config: DispatchConfig,
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    stats: Arc<StatsAggregator>,
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for DispatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchScheduler")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl DispatchScheduler {
    #[must_use]
    pub fn new(config: DispatchConfig, transport: Arc<dyn Transport>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Self {
            config,
            transport,
            limiter,
            stats: Arc::new(StatsAggregator::new()),
            state: Arc::new(Mutex::new(RunState::Idle)),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Ask the run to stop.
    ///
    /// Sends already issued complete and are counted; queued and delayed jobs
    /// are left with their current, non-terminal status.
    pub fn cancel(&self) {
        if self.state().is_finished() {
            tracing::debug!("Run already finished, nothing to cancel");
            return;
        }
        if !self.cancel.is_cancelled() {
            internal!(level = INFO, "Cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Dispatch `jobs` with at most `concurrency_limit` sends in flight.
    ///
    /// Job ids are assigned in submission order starting at 1. A run always
    /// ends with a report, even when every job failed.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::Configuration`] for an invalid configuration or
    /// a zero concurrency limit, before anything is dispatched;
    /// [`SystemError::AlreadyStarted`] if this scheduler has run before; and
    /// [`SystemError::Internal`] if a worker panicked.
    pub async fn run(
        &self,
        jobs: impl IntoIterator<Item = JobSpec>,
        concurrency_limit: usize,
    ) -> Result<RunReport, DispatchError> {
        self.config.validate()?;
        if concurrency_limit == 0 {
            return Err(SystemError::Configuration(
                "concurrency limit must be at least 1".to_string(),
            )
            .into());
        }

        {
            let mut state = self.state.lock();
            if *state != RunState::Idle {
                return Err(SystemError::AlreadyStarted.into());
            }
            *state = RunState::Running;
        }

        let jobs: Vec<Job> = jobs
            .into_iter()
            .zip(1..)
            .map(|(spec, id)| Job::new(JobId(id), spec))
            .collect();
        let total = jobs.len();
        let workers = concurrency_limit.min(total);

        self.stats.start();
        let context = Arc::new(RunContext {
            transport: Arc::clone(&self.transport),
            limiter: Arc::clone(&self.limiter),
            stats: Arc::clone(&self.stats),
            policy: self.config.retry.clone(),
            queue: Arc::new(DispatchQueue::new(jobs)),
            finished: Mutex::new(Vec::with_capacity(total)),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
        });

        internal!(level = INFO, jobs = total, workers, "Dispatch run starting");

        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(worker::run(id, Arc::clone(&context)));
        }

        let mut panicked = None;
        while let Some(result) = pool.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed, cancelling run");
                self.cancel.cancel();
                panicked.get_or_insert_with(|| e.to_string());
            }
        }

        context.queue.settled().await;
        self.stats.finalize();

        let mut jobs = std::mem::take(&mut *context.finished.lock());
        jobs.extend(context.queue.take_remaining());
        jobs.sort_by_key(|job| job.id);

        let state = if self.cancel.is_cancelled() {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        *self.state.lock() = state;

        if let Some(reason) = panicked {
            return Err(SystemError::Internal(reason).into());
        }

        let stats = self.stats.snapshot();
        internal!(
            level = INFO,
            state = ?state,
            sent = stats.total_sent(),
            failed = stats.total_failed(),
            rate_limited = stats.total_rate_limited(),
            elapsed_ms = u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Dispatch run finished"
        );

        Ok(RunReport { state, stats, jobs })
    }
}
