//! Typed error handling for dispatch operations.
//!
//! This module provides structured error types that distinguish between:
//! - Validation failures (malformed target or message) - never retried
//! - Transient failures (network, timeout, server-side) - retried with backoff
//! - Rate limiting by the remote service - retried after a cooldown
//! - Run-level cancellation and system errors

use std::time::Duration;

use herald_common::{JobError, Outcome};
use thiserror::Error;

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The job is structurally invalid and must not be retried.
    #[error("Validation failure: {0}")]
    Validation(#[from] ValidationError),

    /// A failure that can succeed on a later attempt.
    #[error("Transient failure: {0}")]
    Transient(#[from] TransientError),

    /// The remote service is throttling us.
    #[error("Rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The run was cancelled; this is a run-level condition, not a job failure.
    #[error("Dispatch cancelled")]
    Cancelled,

    /// Configuration or internal error.
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Reasons a job is rejected as invalid.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The job record failed local validation.
    #[error(transparent)]
    Record(#[from] JobError),

    /// The remote service rejected the target.
    #[error("Target rejected: {0}")]
    TargetRejected(String),

    /// The remote service rejected the message content.
    #[error("Message rejected: {0}")]
    MessageRejected(String),
}

/// Failures that should be retried with backoff.
#[derive(Debug, Error)]
pub enum TransientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// System-level errors that indicate configuration or internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Invalid configuration; fatal before any job is dispatched.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The scheduler is single-use and has already run.
    #[error("Scheduler already started")]
    AlreadyStarted,

    /// A worker task panicked or was aborted.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |d| format!(" (retry after {}ms)", d.as_millis()))
}

impl DispatchError {
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

impl From<JobError> for DispatchError {
    fn from(error: JobError) -> Self {
        Self::Validation(ValidationError::Record(error))
    }
}

/// Classify a transport error into the outcome contract.
///
/// Cancellation and system errors surfacing from a send are treated as
/// transient: the send did not happen and may succeed later.
impl From<DispatchError> for Outcome {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Validation(e) => Self::ValidationFailure(e.to_string()),
            DispatchError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            DispatchError::Transient(e) => Self::TransientFailure(e.to_string()),
            e @ (DispatchError::Cancelled | DispatchError::System(_)) => {
                Self::TransientFailure(e.to_string())
            }
        }
    }
}
