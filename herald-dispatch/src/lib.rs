//! Rate-limited message dispatch engine
//!
//! This crate runs a batch of send jobs against an external service while
//! holding to the service's quotas:
//! - A global [`RateLimiter`] with per-minute and per-hour windows and a
//!   cooldown entered whenever the service reports throttling
//! - A [`RetryPolicy`] deciding which failed attempts are retried, and when
//! - A [`StatsAggregator`] observing every attempt
//! - A [`DispatchScheduler`] running a bounded worker pool over a
//!   [`DispatchQueue`], with cooperative cancellation
//!
//! The service itself is reached through the [`Transport`] trait.

pub mod config;
pub mod error;
pub mod policy;
pub mod queue;
pub mod rate_limiter;
pub mod scheduler;
pub mod stats;
pub mod transport;

pub use config::DispatchConfig;
pub use error::{DispatchError, SystemError, TransientError, ValidationError};
pub use herald_common::{AttemptRecord, Job, JobId, JobSpec, JobStatus, Message, Target};
pub use policy::{Backoff, Decision, RetryPolicy};
pub use queue::{Dequeue, DispatchQueue};
pub use rate_limiter::{
    Acquire, CooldownMode, MAX_COOLDOWN, RateLimitConfig, RateLimitStats, RateLimiter,
};
pub use scheduler::{DispatchScheduler, RunReport, RunState};
pub use stats::{RunStatsView, StatsAggregator, TargetStats};
pub use transport::{Outcome, Transport};
