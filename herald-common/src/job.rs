//! Job records and their lifecycle
//!
//! A [`JobSpec`] is what a job source hands to the engine: it is validated on
//! construction, so anything that exists as a `JobSpec` is structurally sound.
//! A [`Job`] is the engine's working copy of a spec for the duration of one run,
//! carrying its status and an append-only attempt history.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::{error::JobError, outcome::Outcome};

/// Upper bound on message length, in Unicode scalar values.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const MIN_TARGET_DIGITS: usize = 7;
const MAX_TARGET_DIGITS: usize = 15;

/// A validated phone-number target: `+` followed by 7 to 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Target(Arc<str>);

impl Target {
    /// Parse and validate a target identifier.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidTarget`] if the input is not `+` followed by
    /// 7 to 15 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        let trimmed = raw.trim();
        let valid = trimmed.strip_prefix('+').is_some_and(|digits| {
            (MIN_TARGET_DIGITS..=MAX_TARGET_DIGITS).contains(&digits.len())
                && digits.bytes().all(|b| b.is_ascii_digit())
        });

        if valid {
            Ok(Self(Arc::from(trimmed)))
        } else {
            Err(JobError::InvalidTarget(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated, non-empty message payload of bounded length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Message(Arc<str>);

impl Message {
    /// Validate a message payload.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::EmptyMessage`] for blank input and
    /// [`JobError::MessageTooLong`] when it exceeds [`MAX_MESSAGE_CHARS`].
    pub fn new(raw: &str) -> Result<Self, JobError> {
        if raw.trim().is_empty() {
            return Err(JobError::EmptyMessage);
        }

        let length = raw.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(JobError::MessageTooLong {
                length,
                limit: MAX_MESSAGE_CHARS,
            });
        }

        Ok(Self(Arc::from(raw)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in Unicode scalar values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A validated request to send `message` to `target`, `count` times,
/// waiting `delay` between consecutive sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub target: Target,
    pub message: Message,
    pub count: u32,
    pub delay: Duration,
}

impl JobSpec {
    /// Build a job spec from raw fields.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure among target, message and count.
    pub fn new(target: &str, message: &str, count: u32, delay: Duration) -> Result<Self, JobError> {
        if count == 0 {
            return Err(JobError::ZeroCount);
        }

        Ok(Self {
            target: Target::parse(target)?,
            message: Message::new(message)?,
            count,
            delay,
        })
    }

    /// Convert a delay given in (possibly fractional) seconds.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidDelay`] for negative or non-finite input.
    pub fn delay_from_secs(secs: f64) -> Result<Duration, JobError> {
        Duration::try_from_secs_f64(secs).map_err(|_| JobError::InvalidDelay(secs.to_string()))
    }
}

/// Identifier of a job within a single run, assigned in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Where a job is in its lifecycle.
///
/// `Succeeded`, `Failed` and `Exhausted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobStatus {
    /// Waiting in the queue, either fresh or between sends/retries
    Pending,
    /// A send is being performed right now
    InFlight,
    /// Every requested send was delivered
    Succeeded,
    /// Rejected as structurally invalid; never retried
    Failed,
    /// Waiting out a cooldown imposed by the remote service
    RateLimited,
    /// Transient failures used up the retry budget
    Exhausted,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Exhausted)
    }

    const fn can_advance_to(self, next: Self) -> bool {
        match self {
            Self::Pending | Self::RateLimited => matches!(next, Self::InFlight),
            Self::InFlight => !matches!(next, Self::InFlight),
            Self::Succeeded | Self::Failed | Self::Exhausted => false,
        }
    }
}

/// One attempt to send a job's message, as it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub job_id: JobId,
    pub target: Target,
    /// Position in the job's history, starting at 1; unique per job
    pub sequence: u32,
    /// Which of the job's `count` sends this attempt belongs to, starting at 1
    pub send: u32,
    /// Budget-charged attempt number within the current send
    pub attempt: u32,
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
    #[serde(skip)]
    pub started: Instant,
    pub latency: Duration,
    /// Delay before the job is offered again, if it is
    pub next_delay: Option<Duration>,
}

/// The engine's working state for one job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub spec: JobSpec,
    status: JobStatus,
    delivered: u32,
    attempt: u32,
    history: Vec<AttemptRecord>,
}

impl Job {
    #[must_use]
    pub const fn new(id: JobId, spec: JobSpec) -> Self {
        Self {
            id,
            spec,
            status: JobStatus::Pending,
            delivered: 0,
            attempt: 0,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.spec.target
    }

    /// Number of sends delivered so far.
    #[must_use]
    pub const fn delivered(&self) -> u32 {
        self.delivered
    }

    /// Sends still owed to the target.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.spec.count.saturating_sub(self.delivered)
    }

    /// Budget-charged attempts already made for the current send.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    /// Move the job to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::IllegalTransition`] if the lifecycle forbids the move;
    /// a terminal job never changes status again.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), JobError> {
        if self.status.can_advance_to(next) {
            self.status = next;
            Ok(())
        } else {
            Err(JobError::IllegalTransition {
                from: self.status,
                to: next,
            })
        }
    }

    /// Append an attempt to the history and update the send bookkeeping.
    ///
    /// Rate-limited attempts do not consume the retry budget; a successful
    /// attempt completes the current send and resets the budget for the next.
    pub fn record_attempt(
        &mut self,
        outcome: Outcome,
        attempt: u32,
        started: Instant,
        next_delay: Option<Duration>,
    ) -> AttemptRecord {
        let latency = match &outcome {
            Outcome::Success { latency } => *latency,
            _ => started.elapsed(),
        };

        let record = AttemptRecord {
            job_id: self.id,
            target: self.spec.target.clone(),
            sequence: u32::try_from(self.history.len() + 1).unwrap_or(u32::MAX),
            send: self.delivered + 1,
            attempt,
            outcome,
            at: Utc::now(),
            started,
            latency,
            next_delay,
        };

        match &record.outcome {
            Outcome::Success { .. } => {
                self.delivered += 1;
                self.attempt = 0;
            }
            Outcome::RateLimited { .. } => {}
            Outcome::TransientFailure(_) | Outcome::ValidationFailure(_) => {
                self.attempt = attempt;
            }
        }

        self.history.push(record.clone());
        record
    }
}
